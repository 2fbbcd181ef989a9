//! Permgraph - hierarchical authorization graph
//!
//! Identities (users, groups, service accounts) receive roles on resources
//! (organizations, folders, projects, generic resources). Grants flow down the
//! resource hierarchy and through nested group membership. Queries run against
//! immutable versioned snapshots and never block writers.

pub mod authz;
pub mod settings;
