use miette::{IntoDiagnostic, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::authz::AccessGraphConfig;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    pub graph: Graph,
    pub cache: Cache,
    pub resolver: ResolverSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Graph {
    /// Directory of `.kdl` seed files. Default: seed
    pub seed_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cache {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    /// Total entries across all stripes
    pub capacity: usize,
    pub stripes: usize,
}

fn default_cache_enabled() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverSettings {
    /// Per-query deadline in milliseconds; 0 disables the deadline.
    pub timeout_ms: Option<u64>,
}

impl Default for Graph {
    fn default() -> Self {
        Self {
            seed_dir: PathBuf::from("seed"),
        }
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 10_000,
            stripes: 16,
        }
    }
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            timeout_ms: Some(250),
        }
    }
}

impl Settings {
    pub fn load(path: &str) -> Result<Self> {
        let mut builder = config::Config::builder()
            .set_default(
                "graph.seed_dir",
                Graph::default().seed_dir.to_string_lossy().to_string(),
            )
            .into_diagnostic()?
            .set_default("cache.enabled", Cache::default().enabled)
            .into_diagnostic()?
            .set_default("cache.capacity", Cache::default().capacity as u64)
            .into_diagnostic()?
            .set_default("cache.stripes", Cache::default().stripes as u64)
            .into_diagnostic()?
            .set_default("resolver.timeout_ms", ResolverSettings::default().timeout_ms)
            .into_diagnostic()?;

        // Optional file
        if Path::new(path).exists() {
            builder = builder.add_source(config::File::with_name(path));
        }

        // Environment overrides: PERMGRAPH__CACHE__CAPACITY=500, etc.
        builder = builder.add_source(config::Environment::with_prefix("PERMGRAPH").separator("__"));

        let cfg = builder.build().into_diagnostic()?;
        let mut s: Settings = cfg.try_deserialize().into_diagnostic()?;

        if s.graph.seed_dir.is_relative() {
            s.graph.seed_dir = std::env::current_dir()
                .into_diagnostic()?
                .join(&s.graph.seed_dir);
        }

        Ok(s)
    }

    pub fn access_graph_config(&self) -> AccessGraphConfig {
        AccessGraphConfig {
            cache_capacity: if self.cache.enabled {
                self.cache.capacity
            } else {
                0
            },
            cache_stripes: self.cache.stripes,
            timeout: match self.resolver.timeout_ms {
                None | Some(0) => None,
                Some(ms) => Some(Duration::from_millis(ms)),
            },
        }
    }
}
