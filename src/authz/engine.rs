use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::authz::errors::{AuthzError, AuthzResult};
use crate::authz::roles::{RoleIsPermission, RoleMapper};
use crate::authz::snapshot::{closure, Direction, Snapshot};
use crate::authz::store::NodeIx;
use crate::authz::types::{EdgeKind, PermissionEntry, PermissionSet};

/// Units of work (dequeued nodes or examined links) between two clock reads.
const DEADLINE_CHECK_INTERVAL: u32 = 256;

struct Budget {
    deadline: Option<(Instant, Duration)>,
    until_check: u32,
}

impl Budget {
    fn start(timeout: Option<Duration>) -> Self {
        Self {
            deadline: timeout.map(|t| (Instant::now() + t, t)),
            until_check: 0,
        }
    }

    /// Charge one unit of work. The clock is read on the first call and then
    /// once per `DEADLINE_CHECK_INTERVAL` units.
    fn tick(&mut self) -> AuthzResult<()> {
        if self.until_check > 0 {
            self.until_check -= 1;
            return Ok(());
        }
        self.until_check = DEADLINE_CHECK_INTERVAL - 1;
        match self.deadline {
            Some((deadline, limit)) if Instant::now() >= deadline => {
                Err(AuthzError::ResolutionTimeout {
                    limit_ms: limit.as_millis() as u64,
                })
            }
            _ => Ok(()),
        }
    }
}

/// Computes effective permissions over a snapshot.
///
/// A grant on a resource applies to the resource and all of its descendants;
/// a grant to a group applies to all of its (transitive) members.
#[derive(Clone)]
pub struct Resolver {
    mapper: Arc<dyn RoleMapper>,
    timeout: Option<Duration>,
}

impl Resolver {
    pub fn new(mapper: Arc<dyn RoleMapper>) -> Self {
        Self {
            mapper,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Union of roles `identity` (or any group it belongs to) holds on
    /// `resource` or any of its ancestors.
    pub fn effective_permissions(
        &self,
        snapshot: &Snapshot,
        identity: &str,
        resource: &str,
    ) -> AuthzResult<PermissionSet> {
        let mut budget = Budget::start(self.timeout);
        budget.tick()?;

        let identity_ix = endpoint(snapshot, identity, Endpoint::Identity)?;
        let resource_ix = endpoint(snapshot, resource, Endpoint::Resource)?;
        let state = snapshot.state();

        let (_, ancestry) = closure(
            state,
            resource_ix,
            EdgeKind::ParentOf,
            Direction::Backward,
            || budget.tick(),
        )?;
        let (membership, _) = closure(
            state,
            identity_ix,
            EdgeKind::MemberOf,
            Direction::Forward,
            || budget.tick(),
        )?;

        let mut roles = PermissionSet::new();
        for member in membership {
            let Some(slot) = state.slot(member) else {
                continue;
            };
            for link in slot.out.links(EdgeKind::HasRole) {
                budget.tick()?;
                if !ancestry.contains(link.node) {
                    continue;
                }
                if let Some(role) = &link.role {
                    roles.insert(role.clone());
                }
            }
        }

        tracing::trace!(
            identity,
            resource,
            version = snapshot.version(),
            roles = %roles,
            "resolved effective permissions"
        );
        Ok(roles)
    }

    pub fn has_permission(
        &self,
        snapshot: &Snapshot,
        identity: &str,
        resource: &str,
        permission: &str,
    ) -> AuthzResult<bool> {
        let roles = self.effective_permissions(snapshot, identity, resource)?;
        Ok(self.permits(&roles, permission))
    }

    /// Whether any role in `roles` confers `permission`.
    pub fn permits(&self, roles: &PermissionSet, permission: &str) -> bool {
        roles
            .iter()
            .any(|role| self.mapper.grants(role.as_str(), permission))
    }

    /// Every (resource, role) pair `identity` holds, directly or inherited
    /// down the resource hierarchy, including grants made to its groups.
    pub fn grants_for(
        &self,
        snapshot: &Snapshot,
        identity: &str,
    ) -> AuthzResult<BTreeSet<PermissionEntry>> {
        let mut budget = Budget::start(self.timeout);
        budget.tick()?;

        let identity_ix = endpoint(snapshot, identity, Endpoint::Identity)?;
        let state = snapshot.state();

        let (membership, _) = closure(
            state,
            identity_ix,
            EdgeKind::MemberOf,
            Direction::Forward,
            || budget.tick(),
        )?;

        let mut entries = BTreeSet::new();
        for member in membership {
            let Some(slot) = state.slot(member) else {
                continue;
            };
            for link in slot.out.links(EdgeKind::HasRole) {
                budget.tick()?;
                let Some(role) = &link.role else {
                    continue;
                };
                let (covered, _) = closure(
                    state,
                    link.node,
                    EdgeKind::ParentOf,
                    Direction::Forward,
                    || budget.tick(),
                )?;
                for ix in covered {
                    budget.tick()?;
                    if let Some(resource) = state.slot(ix) {
                        entries.insert(PermissionEntry {
                            resource_id: resource.id.clone(),
                            resource_kind: resource.kind,
                            role: role.clone(),
                        });
                    }
                }
            }
        }
        Ok(entries)
    }
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(Arc::new(RoleIsPermission))
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Copy)]
enum Endpoint {
    Identity,
    Resource,
}

fn endpoint(snapshot: &Snapshot, id: &str, expected: Endpoint) -> AuthzResult<NodeIx> {
    let ix = snapshot.index_of(id)?;
    let kind = snapshot
        .state()
        .slot(ix)
        .map(|s| s.kind)
        .ok_or_else(|| AuthzError::UnknownNode(id.to_string()))?;
    let (ok, expected) = match expected {
        Endpoint::Identity => (kind.is_identity(), "identity"),
        Endpoint::Resource => (kind.is_resource(), "resource"),
    };
    if !ok {
        return Err(AuthzError::KindMismatch {
            id: id.to_string(),
            actual: kind,
            expected,
        });
    }
    Ok(ix)
}
