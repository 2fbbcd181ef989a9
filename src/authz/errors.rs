use miette::Diagnostic;
use thiserror::Error;

use crate::authz::types::{EdgeKind, NodeKind};

#[derive(Debug, Error, Diagnostic)]
pub enum AuthzError {
    #[error("Node `{id}` already exists as `{existing}`, cannot add it as `{requested}`")]
    #[diagnostic(
        code(permgraph::authz::duplicate_node_kind),
        help("Node ids are unique across identities and resources; remove the node first to change its kind")
    )]
    DuplicateNodeKind {
        id: String,
        existing: NodeKind,
        requested: NodeKind,
    },

    #[error("Unknown node `{0}`")]
    #[diagnostic(code(permgraph::authz::unknown_node))]
    UnknownNode(String),

    #[error("Invalid endpoints for `{kind}` edge {source_id} -> {target_id}: {detail}")]
    #[diagnostic(
        code(permgraph::authz::invalid_edge_endpoints),
        help("parent_of joins two resources, member_of joins an identity to a group, has_role joins an identity to a resource")
    )]
    InvalidEdgeEndpoints {
        kind: EdgeKind,
        source_id: String,
        target_id: String,
        detail: String,
    },

    #[error("Invalid payload for `{kind}` edge: {detail}")]
    #[diagnostic(
        code(permgraph::authz::invalid_edge_payload),
        help("Only has_role edges carry a role, and they always do")
    )]
    InvalidEdgePayload { kind: EdgeKind, detail: String },

    #[error("No constraint registered for edge kind `{0}`")]
    #[diagnostic(code(permgraph::authz::unregistered_edge_kind))]
    UnregisteredEdgeKind(EdgeKind),

    #[error("Invalid node id `{0}`")]
    #[diagnostic(code(permgraph::authz::invalid_node_id), help("Node ids must be non-empty"))]
    InvalidNodeId(String),

    #[error("Node `{id}` is a `{actual}`, expected a {expected}")]
    #[diagnostic(code(permgraph::authz::kind_mismatch))]
    KindMismatch {
        id: String,
        actual: NodeKind,
        expected: &'static str,
    },

    #[error("Resolution exceeded its {limit_ms}ms deadline")]
    #[diagnostic(
        code(permgraph::authz::resolution_timeout),
        help("Raise `resolver.timeout_ms` or reduce fan-out in the graph")
    )]
    ResolutionTimeout { limit_ms: u64 },

    #[error("Resolution cache inconsistency: {0}")]
    #[diagnostic(code(permgraph::authz::cache_inconsistency))]
    CacheInconsistency(String),

    #[error("Snapshot for version {requested} is no longer available (latest is {latest})")]
    #[diagnostic(
        code(permgraph::authz::snapshot_unavailable),
        help("Hold on to the Snapshot handle for as long as you need to query that version")
    )]
    SnapshotUnavailable { requested: u64, latest: u64 },

    #[error("Cyclic role inheritance detected: {0}")]
    #[diagnostic(
        code(permgraph::authz::cyclic_roles),
        help("Check the `includes` lists in your role definitions for circular references")
    )]
    CyclicRoleInheritance(String),

    #[error("Undefined role `{0}`")]
    #[diagnostic(
        code(permgraph::authz::undefined_role),
        help("Define the role with: role \"<name>\" {{ permissions {{ ... }} }}")
    )]
    UndefinedRole(String),

    #[error("Invalid seed: {0}")]
    #[diagnostic(
        code(permgraph::authz::invalid_seed),
        help("Seed files contain node declarations (user, group, folder, ...) and parent, member, grant or role nodes")
    )]
    InvalidSeed(String),

    #[error("KDL parse error: {0}")]
    #[diagnostic(
        code(permgraph::authz::kdl_parse),
        help("Check your KDL file syntax against https://kdl.dev")
    )]
    KdlParse(String),

    #[error("Failed to load seed file `{path}`")]
    #[diagnostic(code(permgraph::authz::seed_load))]
    SeedLoadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    #[diagnostic(code(permgraph::authz::io))]
    Io(#[from] std::io::Error),
}

impl AuthzError {
    /// Errors raised by graph mutation validation. They never leave the graph
    /// partially modified.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::DuplicateNodeKind { .. }
                | Self::UnknownNode(_)
                | Self::InvalidEdgeEndpoints { .. }
                | Self::InvalidEdgePayload { .. }
                | Self::UnregisteredEdgeKind(_)
                | Self::InvalidNodeId(_)
        )
    }

    /// Internal invariant violations. Seeing one means a bug.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::CacheInconsistency(_))
    }
}

pub type AuthzResult<T> = Result<T, AuthzError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_variants() {
        let errors = vec![
            AuthzError::DuplicateNodeKind {
                id: "x".into(),
                existing: NodeKind::USER,
                requested: NodeKind::FOLDER,
            },
            AuthzError::UnknownNode("x".into()),
            AuthzError::ResolutionTimeout { limit_ms: 5 },
            AuthzError::CacheInconsistency("bad".into()),
            AuthzError::SnapshotUnavailable {
                requested: 1,
                latest: 3,
            },
        ];
        for error in errors {
            assert!(!error.to_string().is_empty());
        }
    }

    #[test]
    fn test_classification() {
        assert!(AuthzError::UnknownNode("x".into()).is_structural());
        assert!(!AuthzError::ResolutionTimeout { limit_ms: 1 }.is_structural());
        assert!(AuthzError::CacheInconsistency("x".into()).is_fatal());
        assert!(!AuthzError::UnknownNode("x".into()).is_fatal());
    }
}
