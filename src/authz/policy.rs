use crate::authz::errors::AuthzError;
use crate::authz::roles::RoleDef;
use crate::authz::types::{Edge, NodeId, NodeKind};
use kdl::{KdlDocument, KdlNode};

/// Everything declared by one seed file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedDocument {
    pub nodes: Vec<(NodeId, NodeKind)>,
    pub edges: Vec<Edge>,
    pub roles: Vec<RoleDef>,
}

impl SeedDocument {
    pub fn merge(&mut self, other: SeedDocument) {
        self.nodes.extend(other.nodes);
        self.edges.extend(other.edges);
        self.roles.extend(other.roles);
    }
}

/// Parse a KDL seed document into nodes, edges and role definitions.
pub fn parse_kdl_document(source: &str) -> Result<SeedDocument, AuthzError> {
    let doc: KdlDocument = source
        .parse()
        .map_err(|e: kdl::KdlError| AuthzError::KdlParse(e.to_string()))?;

    let mut seed = SeedDocument::default();

    for node in doc.nodes() {
        let name = node.name().value();
        if let Some(kind) = NodeKind::parse(name) {
            let id = first_string_arg(node).ok_or_else(|| {
                AuthzError::InvalidSeed(format!(
                    "{name} node requires an id argument (e.g. {name} \"id\")"
                ))
            })?;
            seed.nodes.push((NodeId::new(id), kind));
            continue;
        }

        match name {
            "parent" => {
                let parent = first_string_arg(node).ok_or_else(|| {
                    AuthzError::InvalidSeed(
                        "parent node requires an id argument (e.g. parent \"org_1\" child=\"folder_1\")"
                            .into(),
                    )
                })?;
                let child = string_prop(node, "child", &format!("parent `{parent}`"))?;
                seed.edges.push(Edge::parent_of(parent, child));
            }
            "member" => {
                let member = first_string_arg(node).ok_or_else(|| {
                    AuthzError::InvalidSeed(
                        "member node requires an id argument (e.g. member \"adi\" group=\"eng\")"
                            .into(),
                    )
                })?;
                let group = string_prop(node, "group", &format!("member `{member}`"))?;
                seed.edges.push(Edge::member_of(member, group));
            }
            "grant" => {
                let role = first_string_arg(node).ok_or_else(|| {
                    AuthzError::InvalidSeed(
                        "grant node requires a role argument (e.g. grant \"owner\" to=\"adi\" on=\"folder_1\")"
                            .into(),
                    )
                })?;
                let context = format!("grant `{role}`");
                let to = string_prop(node, "to", &context)?;
                let on = string_prop(node, "on", &context)?;
                seed.edges.push(Edge::has_role(to, on, role));
            }
            "role" => {
                let name = first_string_arg(node).ok_or_else(|| {
                    AuthzError::InvalidSeed(
                        "role node requires a string argument (e.g. role \"owner\")".into(),
                    )
                })?;

                let mut permissions = Vec::new();
                let mut includes = Vec::new();

                if let Some(children) = node.children() {
                    for child in children.nodes() {
                        match child.name().value() {
                            "permissions" => {
                                permissions = dash_list(child);
                            }
                            "includes" => {
                                includes = dash_list(child);
                            }
                            other => {
                                return Err(AuthzError::InvalidSeed(format!(
                                    "unexpected child `{other}` in role `{name}` (expected `permissions` or `includes`)"
                                )));
                            }
                        }
                    }
                }

                seed.roles.push(RoleDef {
                    name,
                    permissions,
                    includes,
                });
            }
            other => {
                tracing::warn!("ignoring unknown top-level KDL node `{other}`");
            }
        }
    }

    Ok(seed)
}

/// Extract the first string argument from a KDL node.
fn first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn string_prop(node: &KdlNode, key: &str, context: &str) -> Result<String, AuthzError> {
    node.get(key)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
        .ok_or_else(|| {
            AuthzError::InvalidSeed(format!("{context} missing string property `{key}`"))
        })
}

/// Extract dash-list children: nodes named "-" whose first argument is a string.
/// ```kdl
/// permissions {
///     - "projects.get"
///     - "projects.update"
/// }
/// ```
fn dash_list(node: &KdlNode) -> Vec<String> {
    let Some(children) = node.children() else {
        return Vec::new();
    };
    children
        .nodes()
        .iter()
        .filter(|n| n.name().value() == "-")
        .filter_map(first_string_arg)
        .collect()
}
