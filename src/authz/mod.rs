pub mod cache;
pub mod engine;
pub mod errors;
pub mod loader;
pub mod policy;
pub mod registry;
pub mod roles;
pub mod snapshot;
pub mod store;
pub mod types;

use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use cache::ResolutionCache;
use engine::Resolver;
use errors::AuthzResult;
use registry::TypeRegistry;
use roles::{RoleIsPermission, RoleMapper};
use snapshot::{Snapshot, SnapshotManager};
use store::GraphStore;
use types::{Decision, Edge, MutationOutcome, NodeId, NodeKind, PermissionEntry, PermissionSet};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessGraphConfig {
    /// Total cache entries; 0 disables the cache.
    pub cache_capacity: usize,
    pub cache_stripes: usize,
    /// Per-query deadline; `None` lets resolution run to completion.
    pub timeout: Option<Duration>,
}

impl Default for AccessGraphConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 10_000,
            cache_stripes: 16,
            timeout: Some(Duration::from_millis(250)),
        }
    }
}

/// Versioned authorization graph with its resolver and result cache.
///
/// Mutations are serialized internally; queries run against immutable
/// snapshots and never wait for writers.
#[derive(Debug)]
pub struct AccessGraph {
    store: Arc<GraphStore>,
    snapshots: SnapshotManager,
    resolver: Resolver,
    cache: Option<ResolutionCache>,
}

impl AccessGraph {
    pub fn new(config: AccessGraphConfig) -> Self {
        Self::with_parts(config, TypeRegistry::default(), Arc::new(RoleIsPermission))
    }

    pub fn with_parts(
        config: AccessGraphConfig,
        registry: TypeRegistry,
        mapper: Arc<dyn RoleMapper>,
    ) -> Self {
        let store = Arc::new(GraphStore::with_registry(registry));
        let cache = match NonZeroUsize::new(config.cache_capacity) {
            Some(capacity) => {
                let stripes = NonZeroUsize::new(config.cache_stripes).unwrap_or(NonZeroUsize::MIN);
                Some(ResolutionCache::new(capacity, stripes))
            }
            None => None,
        };
        Self {
            snapshots: SnapshotManager::new(store.clone()),
            store,
            resolver: Resolver::new(mapper).with_timeout(config.timeout),
            cache,
        }
    }

    pub fn store(&self) -> &Arc<GraphStore> {
        &self.store
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn cache(&self) -> Option<&ResolutionCache> {
        self.cache.as_ref()
    }

    pub fn current_version(&self) -> u64 {
        self.store.current_version()
    }

    // ---------- mutation ----------

    pub fn add_node(&self, id: impl Into<NodeId>, kind: NodeKind) -> AuthzResult<MutationOutcome> {
        let outcome = self.store.add_node(id, kind)?;
        self.observe(outcome);
        Ok(outcome)
    }

    pub fn add_edge(&self, edge: Edge) -> AuthzResult<MutationOutcome> {
        let outcome = self.store.add_edge(edge)?;
        self.observe(outcome);
        Ok(outcome)
    }

    pub fn remove_node(&self, id: &str) -> MutationOutcome {
        let outcome = self.store.remove_node(id);
        self.observe(outcome);
        outcome
    }

    pub fn remove_edge(&self, edge: &Edge) -> MutationOutcome {
        let outcome = self.store.remove_edge(edge);
        self.observe(outcome);
        outcome
    }

    fn observe(&self, outcome: MutationOutcome) {
        if let (true, Some(cache)) = (outcome.changed, &self.cache) {
            cache.observe_version(outcome.version);
        }
    }

    // ---------- snapshots ----------

    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.latest()
    }

    pub fn snapshot_at(&self, version: u64) -> AuthzResult<Snapshot> {
        self.snapshots.at(version)
    }

    // ---------- queries ----------

    pub fn effective_permissions(&self, identity: &str, resource: &str) -> AuthzResult<PermissionSet> {
        self.effective_permissions_in(&self.snapshot(), identity, resource)
    }

    pub fn effective_permissions_in(
        &self,
        snapshot: &Snapshot,
        identity: &str,
        resource: &str,
    ) -> AuthzResult<PermissionSet> {
        let Some(cache) = &self.cache else {
            return self
                .resolver
                .effective_permissions(snapshot, identity, resource);
        };

        if let Some(hit) = cache.get(snapshot.version(), identity, resource)? {
            return Ok(hit);
        }
        let set = self
            .resolver
            .effective_permissions(snapshot, identity, resource)?;
        cache.put(snapshot.version(), identity, resource, set.clone());
        Ok(set)
    }

    pub fn has_permission(&self, identity: &str, resource: &str, permission: &str) -> AuthzResult<bool> {
        self.has_permission_in(&self.snapshot(), identity, resource, permission)
    }

    pub fn has_permission_in(
        &self,
        snapshot: &Snapshot,
        identity: &str,
        resource: &str,
        permission: &str,
    ) -> AuthzResult<bool> {
        let roles = self.effective_permissions_in(snapshot, identity, resource)?;
        Ok(self.resolver.permits(&roles, permission))
    }

    pub fn grants_for(&self, identity: &str) -> AuthzResult<BTreeSet<PermissionEntry>> {
        self.resolver.grants_for(&self.snapshot(), identity)
    }

    /// Enforcement entry point. Anything other than a positive answer,
    /// including every error, is a denial.
    pub fn check(&self, identity: &str, resource: &str, permission: &str) -> Decision {
        match self.has_permission(identity, resource, permission) {
            Ok(true) => Decision::Allow,
            Ok(false) => Decision::Deny {
                reason: format!("no grant of `{permission}` reaches `{resource}` for `{identity}`"),
            },
            Err(e) => {
                if e.is_fatal() {
                    tracing::error!(identity, resource, permission, error = %e, "authorization aborted");
                } else {
                    tracing::warn!(identity, resource, permission, error = %e, "authorization failed closed");
                }
                Decision::Deny {
                    reason: e.to_string(),
                }
            }
        }
    }
}

impl Default for AccessGraph {
    fn default() -> Self {
        Self::new(AccessGraphConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::errors::AuthzError;

    fn scenario(config: AccessGraphConfig) -> AccessGraph {
        let graph = AccessGraph::new(config);
        graph.add_node("o1", NodeKind::ORGANIZATION).unwrap();
        graph.add_node("f1", NodeKind::FOLDER).unwrap();
        graph.add_node("p1", NodeKind::PROJECT).unwrap();
        graph.add_node("adi", NodeKind::USER).unwrap();
        graph.add_edge(Edge::parent_of("o1", "f1")).unwrap();
        graph.add_edge(Edge::parent_of("f1", "p1")).unwrap();
        graph.add_edge(Edge::has_role("adi", "f1", "owner")).unwrap();
        graph
    }

    #[test]
    fn test_scenario_with_and_without_cache() {
        for config in [
            AccessGraphConfig::default(),
            AccessGraphConfig {
                cache_capacity: 0,
                ..Default::default()
            },
        ] {
            let graph = scenario(config);
            assert!(graph.has_permission("adi", "p1", "owner").unwrap());
            assert!(!graph.has_permission("adi", "o1", "owner").unwrap());
        }
    }

    #[test]
    fn test_cache_disabled_with_zero_capacity() {
        let graph = scenario(AccessGraphConfig {
            cache_capacity: 0,
            ..Default::default()
        });
        assert!(graph.cache().is_none());
    }

    #[test]
    fn test_repeated_query_hits_cache() {
        let graph = scenario(AccessGraphConfig::default());
        graph.has_permission("adi", "p1", "owner").unwrap();
        graph.has_permission("adi", "p1", "viewer").unwrap();
        let stats = graph.cache().unwrap().stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn test_mutation_invalidates_by_version() {
        let graph = scenario(AccessGraphConfig::default());
        assert!(graph.has_permission("adi", "p1", "owner").unwrap());

        let outcome = graph.remove_edge(&Edge::parent_of("f1", "p1"));
        assert!(outcome.changed);
        assert_eq!(graph.cache().unwrap().newest_version(), outcome.version);
        assert!(!graph.has_permission("adi", "p1", "owner").unwrap());
    }

    #[test]
    fn test_check_fails_closed() {
        let graph = scenario(AccessGraphConfig::default());
        assert_eq!(graph.check("adi", "p1", "owner"), Decision::Allow);
        assert!(!graph.check("adi", "o1", "owner").is_allowed());

        match graph.check("adi", "ghost", "owner") {
            Decision::Deny { reason } => assert!(reason.contains("ghost")),
            Decision::Allow => panic!("unknown resource must deny"),
        }

        let slow = scenario(AccessGraphConfig {
            timeout: Some(Duration::ZERO),
            ..Default::default()
        });
        assert!(!slow.check("adi", "p1", "owner").is_allowed());
        assert!(matches!(
            slow.has_permission("adi", "p1", "owner").unwrap_err(),
            AuthzError::ResolutionTimeout { .. }
        ));
    }

    #[test]
    fn test_held_snapshot_answers_for_its_version() {
        let graph = scenario(AccessGraphConfig::default());
        let before = graph.snapshot();
        graph.remove_node("f1");

        assert!(graph
            .has_permission_in(&before, "adi", "p1", "owner")
            .unwrap());
        assert!(!graph.has_permission("adi", "p1", "owner").unwrap());

        let again = graph.snapshot_at(before.version()).unwrap();
        assert!(graph.has_permission_in(&again, "adi", "p1", "owner").unwrap());
    }
}
