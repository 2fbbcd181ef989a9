#![allow(dead_code)]

pub mod builders;
pub mod seed;

pub use builders::{gcp_hierarchy, GraphBuilder};
pub use seed::{TestSeedDir, GCP_SEED};
