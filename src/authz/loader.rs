use std::path::Path;
use std::sync::Arc;

use crate::authz::errors::AuthzError;
use crate::authz::policy::{parse_kdl_document, SeedDocument};
use crate::authz::registry::TypeRegistry;
use crate::authz::roles::RoleCatalog;
use crate::authz::{AccessGraph, AccessGraphConfig};

/// Read and parse every `.kdl` file in `dir`, in sorted path order.
pub fn load_seed_dir(dir: &Path) -> Result<SeedDocument, AuthzError> {
    if !dir.is_dir() {
        return Err(AuthzError::InvalidSeed(format!(
            "seed directory `{}` does not exist or is not a directory",
            dir.display()
        )));
    }

    let mut entries: Vec<_> = std::fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path()
                .extension()
                .map(|ext| ext == "kdl")
                .unwrap_or(false)
        })
        .collect();
    entries.sort_by_key(|e| e.path());

    let mut seed = SeedDocument::default();
    for entry in entries {
        let path = entry.path();
        let contents =
            std::fs::read_to_string(&path).map_err(|source| AuthzError::SeedLoadError {
                path: path.display().to_string(),
                source,
            })?;
        tracing::debug!(path = %path.display(), "parsing seed file");
        seed.merge(parse_kdl_document(&contents)?);
    }
    Ok(seed)
}

/// Build an `AccessGraph` from a parsed seed. All nodes are added before any
/// edge so files may reference nodes declared later.
pub fn build_graph(seed: SeedDocument, config: AccessGraphConfig) -> Result<AccessGraph, AuthzError> {
    let catalog = RoleCatalog::compile(seed.roles)?;
    let roles = catalog.len();
    let graph = AccessGraph::with_parts(config, TypeRegistry::default(), Arc::new(catalog));

    for (id, kind) in seed.nodes {
        graph.add_node(id, kind)?;
    }
    for edge in seed.edges {
        graph.add_edge(edge)?;
    }

    tracing::info!(
        nodes = graph.store().node_count(),
        edges = graph.store().edge_count(),
        roles,
        version = graph.current_version(),
        "Loaded access graph seed"
    );
    Ok(graph)
}

pub fn load_access_graph(dir: &Path, config: AccessGraphConfig) -> Result<AccessGraph, AuthzError> {
    build_graph(load_seed_dir(dir)?, config)
}
