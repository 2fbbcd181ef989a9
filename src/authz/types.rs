use std::borrow::Borrow;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Identifier of a node. Identities and resources share one namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(Arc<str>);

impl NodeId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Role token carried by a `HasRole` edge, e.g. "owner".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Role(Arc<str>);

impl Role {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Role {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Role {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Role {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IdentityKind {
    User,
    Group,
    ServiceAccount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    Organization,
    Folder,
    Project,
    Generic,
}

/// Immutable variant tag of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeKind {
    Identity(IdentityKind),
    Resource(ResourceKind),
}

impl NodeKind {
    pub const USER: NodeKind = NodeKind::Identity(IdentityKind::User);
    pub const GROUP: NodeKind = NodeKind::Identity(IdentityKind::Group);
    pub const SERVICE_ACCOUNT: NodeKind = NodeKind::Identity(IdentityKind::ServiceAccount);
    pub const ORGANIZATION: NodeKind = NodeKind::Resource(ResourceKind::Organization);
    pub const FOLDER: NodeKind = NodeKind::Resource(ResourceKind::Folder);
    pub const PROJECT: NodeKind = NodeKind::Resource(ResourceKind::Project);
    pub const RESOURCE: NodeKind = NodeKind::Resource(ResourceKind::Generic);

    /// Parse the lowercase tag used in seed files and on the command line.
    pub fn parse(s: &str) -> Option<Self> {
        let kind = match s {
            "user" => Self::USER,
            "group" => Self::GROUP,
            "service-account" | "service_account" => Self::SERVICE_ACCOUNT,
            "organization" => Self::ORGANIZATION,
            "folder" => Self::FOLDER,
            "project" => Self::PROJECT,
            "resource" => Self::RESOURCE,
            _ => return None,
        };
        Some(kind)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Identity(IdentityKind::User) => "user",
            Self::Identity(IdentityKind::Group) => "group",
            Self::Identity(IdentityKind::ServiceAccount) => "service-account",
            Self::Resource(ResourceKind::Organization) => "organization",
            Self::Resource(ResourceKind::Folder) => "folder",
            Self::Resource(ResourceKind::Project) => "project",
            Self::Resource(ResourceKind::Generic) => "resource",
        }
    }

    pub fn is_identity(&self) -> bool {
        matches!(self, Self::Identity(_))
    }

    pub fn is_resource(&self) -> bool {
        matches!(self, Self::Resource(_))
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Edge kinds known to the graph. Structural constraints live in the
/// [`TypeRegistry`](crate::authz::registry::TypeRegistry), not here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EdgeKind {
    /// parent resource -> child resource
    ParentOf,
    /// member identity -> group
    MemberOf,
    /// identity -> resource, carries a role
    HasRole,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ParentOf => "parent_of",
            Self::MemberOf => "member_of",
            Self::HasRole => "has_role",
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directed, typed relation between two nodes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Edge {
    pub source: NodeId,
    pub target: NodeId,
    pub kind: EdgeKind,
    pub role: Option<Role>,
}

impl Edge {
    pub fn new(
        source: impl Into<NodeId>,
        target: impl Into<NodeId>,
        kind: EdgeKind,
        role: Option<Role>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            kind,
            role,
        }
    }

    pub fn parent_of(parent: impl Into<NodeId>, child: impl Into<NodeId>) -> Self {
        Self::new(parent, child, EdgeKind::ParentOf, None)
    }

    pub fn member_of(member: impl Into<NodeId>, group: impl Into<NodeId>) -> Self {
        Self::new(member, group, EdgeKind::MemberOf, None)
    }

    pub fn has_role(
        identity: impl Into<NodeId>,
        resource: impl Into<NodeId>,
        role: impl Into<Role>,
    ) -> Self {
        Self::new(identity, resource, EdgeKind::HasRole, Some(role.into()))
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.role {
            Some(role) => write!(f, "{} -[{}:{}]-> {}", self.source, self.kind, role, self.target),
            None => write!(f, "{} -[{}]-> {}", self.source, self.kind, self.target),
        }
    }
}

/// Effective role set for an (identity, resource) pair. Always sorted, never
/// contains duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet(BTreeSet<Role>);

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, role: Role) -> bool {
        self.0.insert(role)
    }

    pub fn contains(&self, role: &str) -> bool {
        self.0.contains(role)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Role> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(Role::as_str).collect()
    }
}

impl FromIterator<Role> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = Role>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for PermissionSet {
    type Item = Role;
    type IntoIter = std::collections::btree_set::IntoIter<Role>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for PermissionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.names().join(", "))
    }
}

/// One role an identity holds on one resource, directly or inherited.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PermissionEntry {
    pub resource_id: NodeId,
    pub resource_kind: NodeKind,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeRecord {
    pub id: NodeId,
    pub kind: NodeKind,
}

/// Item produced by the introspection iterator of a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GraphRecord {
    Node(NodeRecord),
    Edge(Edge),
}

/// Result of a mutation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationOutcome {
    /// Store version after the call.
    pub version: u64,
    /// `false` if the call was a no-op and the version was not bumped.
    pub changed: bool,
}

/// Fail-closed answer handed to enforcement points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny { reason: String },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}
