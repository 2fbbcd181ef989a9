use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::authz::errors::AuthzError;
use crate::authz::types::{Edge, EdgeKind, IdentityKind, NodeKind};

/// Structural rule for one edge kind.
pub trait EdgeConstraint: Send + Sync {
    /// Whether an edge of this kind may join a `source` node to a `target` node.
    fn allows(&self, source: NodeKind, target: NodeKind) -> bool;

    /// Whether edges of this kind carry a role payload.
    fn carries_role(&self) -> bool {
        false
    }

    /// Human readable form of the rule, used in error messages.
    fn describe(&self) -> &str;
}

struct ParentOfConstraint;

impl EdgeConstraint for ParentOfConstraint {
    fn allows(&self, source: NodeKind, target: NodeKind) -> bool {
        source.is_resource() && target.is_resource()
    }

    fn describe(&self) -> &str {
        "source and target must both be resources"
    }
}

struct MemberOfConstraint;

impl EdgeConstraint for MemberOfConstraint {
    fn allows(&self, source: NodeKind, target: NodeKind) -> bool {
        source.is_identity() && target == NodeKind::Identity(IdentityKind::Group)
    }

    fn describe(&self) -> &str {
        "source must be an identity and target must be a group"
    }
}

struct HasRoleConstraint;

impl EdgeConstraint for HasRoleConstraint {
    fn allows(&self, source: NodeKind, target: NodeKind) -> bool {
        source.is_identity() && target.is_resource()
    }

    fn carries_role(&self) -> bool {
        true
    }

    fn describe(&self) -> &str {
        "source must be an identity and target must be a resource"
    }
}

/// Maps each edge kind to the constraint its endpoints must satisfy.
#[derive(Clone)]
pub struct TypeRegistry {
    constraints: HashMap<EdgeKind, Arc<dyn EdgeConstraint>>,
}

impl TypeRegistry {
    /// A registry with no constraints; every edge is rejected until kinds are
    /// registered.
    pub fn empty() -> Self {
        Self {
            constraints: HashMap::new(),
        }
    }

    /// Register (or replace) the constraint for `kind`.
    pub fn register(&mut self, kind: EdgeKind, constraint: Arc<dyn EdgeConstraint>) {
        self.constraints.insert(kind, constraint);
    }

    pub fn constraint(&self, kind: EdgeKind) -> Option<&Arc<dyn EdgeConstraint>> {
        self.constraints.get(&kind)
    }

    /// Check an edge against the constraint of its kind, given the kinds of
    /// its (already resolved) endpoints.
    pub fn validate(
        &self,
        edge: &Edge,
        source: NodeKind,
        target: NodeKind,
    ) -> Result<(), AuthzError> {
        let constraint = self
            .constraints
            .get(&edge.kind)
            .ok_or(AuthzError::UnregisteredEdgeKind(edge.kind))?;

        if !constraint.allows(source, target) {
            return Err(AuthzError::InvalidEdgeEndpoints {
                kind: edge.kind,
                source_id: format!("{}:{}", source, edge.source),
                target_id: format!("{}:{}", target, edge.target),
                detail: constraint.describe().to_string(),
            });
        }

        match (constraint.carries_role(), &edge.role) {
            (true, None) => Err(AuthzError::InvalidEdgePayload {
                kind: edge.kind,
                detail: "missing role".into(),
            }),
            (true, Some(role)) if role.as_str().is_empty() => Err(AuthzError::InvalidEdgePayload {
                kind: edge.kind,
                detail: "role must be non-empty".into(),
            }),
            (false, Some(role)) => Err(AuthzError::InvalidEdgePayload {
                kind: edge.kind,
                detail: format!("unexpected role `{role}`"),
            }),
            _ => Ok(()),
        }
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(EdgeKind::ParentOf, Arc::new(ParentOfConstraint));
        registry.register(EdgeKind::MemberOf, Arc::new(MemberOfConstraint));
        registry.register(EdgeKind::HasRole, Arc::new(HasRoleConstraint));
        registry
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.constraints.keys().collect();
        kinds.sort();
        f.debug_struct("TypeRegistry").field("kinds", &kinds).finish()
    }
}
