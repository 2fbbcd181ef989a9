use permgraph::authz::types::{Edge, NodeKind};
use permgraph::authz::{AccessGraph, AccessGraphConfig};

/// Builder for creating test graphs
pub struct GraphBuilder {
    config: AccessGraphConfig,
    nodes: Vec<(String, NodeKind)>,
    edges: Vec<Edge>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self {
            config: AccessGraphConfig::default(),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn without_cache(mut self) -> Self {
        self.config.cache_capacity = 0;
        self
    }

    pub fn with_config(mut self, config: AccessGraphConfig) -> Self {
        self.config = config;
        self
    }

    pub fn node(mut self, id: &str, kind: NodeKind) -> Self {
        self.nodes.push((id.to_string(), kind));
        self
    }

    pub fn organization(self, id: &str) -> Self {
        self.node(id, NodeKind::ORGANIZATION)
    }

    pub fn folder(self, id: &str) -> Self {
        self.node(id, NodeKind::FOLDER)
    }

    pub fn project(self, id: &str) -> Self {
        self.node(id, NodeKind::PROJECT)
    }

    pub fn user(self, id: &str) -> Self {
        self.node(id, NodeKind::USER)
    }

    pub fn group(self, id: &str) -> Self {
        self.node(id, NodeKind::GROUP)
    }

    pub fn parent(mut self, parent: &str, child: &str) -> Self {
        self.edges.push(Edge::parent_of(parent, child));
        self
    }

    pub fn member(mut self, member: &str, group: &str) -> Self {
        self.edges.push(Edge::member_of(member, group));
        self
    }

    pub fn grant(mut self, role: &str, identity: &str, resource: &str) -> Self {
        self.edges.push(Edge::has_role(identity, resource, role));
        self
    }

    pub fn build(self) -> AccessGraph {
        let graph = AccessGraph::new(self.config);
        for (id, kind) in self.nodes {
            graph
                .add_node(id.as_str(), kind)
                .expect("Failed to add test node");
        }
        for edge in self.edges {
            graph.add_edge(edge).expect("Failed to add test edge");
        }
        graph
    }
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// org_1 -> folder_1 -> project_1, with `adi` holding `owner` on folder_1.
pub fn gcp_hierarchy() -> GraphBuilder {
    GraphBuilder::new()
        .organization("org_1")
        .folder("folder_1")
        .project("project_1")
        .user("adi")
        .parent("org_1", "folder_1")
        .parent("folder_1", "project_1")
        .grant("owner", "adi", "folder_1")
}
