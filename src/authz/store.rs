use std::sync::Arc;

use arc_swap::ArcSwap;
use im::{OrdMap, OrdSet, Vector};
use parking_lot::Mutex;

use crate::authz::errors::{AuthzError, AuthzResult};
use crate::authz::registry::TypeRegistry;
use crate::authz::types::{Edge, EdgeKind, MutationOutcome, NodeId, NodeKind, Role};

/// Dense index of a node inside one graph state. Only meaningful together
/// with the state it came from.
pub(crate) type NodeIx = u32;

/// One end of an edge as seen from the other end.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Link {
    pub(crate) node: NodeIx,
    pub(crate) role: Option<Role>,
}

/// Neighbor sets, indexed separately per edge kind.
#[derive(Debug, Clone, Default)]
pub(crate) struct Adjacency(OrdMap<EdgeKind, OrdSet<Link>>);

impl Adjacency {
    pub(crate) fn links(&self, kind: EdgeKind) -> impl Iterator<Item = &Link> {
        self.0.get(&kind).into_iter().flat_map(|links| links.iter())
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (EdgeKind, &Link)> {
        self.0
            .iter()
            .flat_map(|(kind, links)| links.iter().map(move |l| (*kind, l)))
    }

    fn contains(&self, kind: EdgeKind, link: &Link) -> bool {
        self.0.get(&kind).is_some_and(|links| links.contains(link))
    }

    fn insert(&mut self, kind: EdgeKind, link: Link) -> bool {
        match self.0.get_mut(&kind) {
            Some(links) => links.insert(link).is_none(),
            None => {
                self.0.insert(kind, OrdSet::unit(link));
                true
            }
        }
    }

    fn remove(&mut self, kind: EdgeKind, link: &Link) -> bool {
        let Some(links) = self.0.get_mut(&kind) else {
            return false;
        };
        let removed = links.remove(link).is_some();
        if links.is_empty() {
            self.0.remove(&kind);
        }
        removed
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Slot {
    pub(crate) id: NodeId,
    pub(crate) kind: NodeKind,
    pub(crate) out: Adjacency,
    pub(crate) inc: Adjacency,
}

/// Full graph contents at one version. Every collection is persistent, so a
/// clone is O(1) and a write copies only the path it touches.
#[derive(Debug, Clone, Default)]
pub(crate) struct GraphState {
    pub(crate) version: u64,
    index: im::HashMap<NodeId, NodeIx>,
    slots: Vector<Option<Slot>>,
    free: Vector<NodeIx>,
    edge_count: usize,
}

impl GraphState {
    pub(crate) fn lookup(&self, id: &str) -> Option<NodeIx> {
        self.index.get(id).copied()
    }

    pub(crate) fn slot(&self, ix: NodeIx) -> Option<&Slot> {
        self.slots.get(ix as usize).and_then(Option::as_ref)
    }

    /// Upper bound (exclusive) for node indices in this state.
    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn slots(&self) -> impl Iterator<Item = (NodeIx, &Slot)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(ix, slot)| slot.as_ref().map(|s| (ix as NodeIx, s)))
    }

    pub(crate) fn node_count(&self) -> usize {
        self.index.len()
    }

    pub(crate) fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// Rebuild the public edge value for a link stored in `from`'s forward
    /// adjacency.
    pub(crate) fn edge_from(&self, from: &Slot, kind: EdgeKind, link: &Link) -> Option<Edge> {
        let to = self.slot(link.node)?;
        Some(Edge {
            source: from.id.clone(),
            target: to.id.clone(),
            kind,
            role: link.role.clone(),
        })
    }

    fn slot_mut(&mut self, ix: NodeIx) -> Option<&mut Slot> {
        self.slots.get_mut(ix as usize).and_then(Option::as_mut)
    }

    fn insert_node(&mut self, id: NodeId, kind: NodeKind) -> AuthzResult<bool> {
        if id.as_str().is_empty() {
            return Err(AuthzError::InvalidNodeId(id.to_string()));
        }
        if let Some(existing) = self.kind_of(id.as_str()) {
            if existing == kind {
                return Ok(false);
            }
            return Err(AuthzError::DuplicateNodeKind {
                id: id.to_string(),
                existing,
                requested: kind,
            });
        }

        let slot = Slot {
            id: id.clone(),
            kind,
            out: Adjacency::default(),
            inc: Adjacency::default(),
        };
        let ix = match self.free.pop_back() {
            Some(ix) => {
                self.slots.set(ix as usize, Some(slot));
                ix
            }
            None => {
                self.slots.push_back(Some(slot));
                (self.slots.len() - 1) as NodeIx
            }
        };
        self.index.insert(id, ix);
        Ok(true)
    }

    fn kind_of(&self, id: &str) -> Option<NodeKind> {
        self.lookup(id).and_then(|ix| self.slot(ix)).map(|s| s.kind)
    }

    fn resolve(&self, id: &NodeId) -> AuthzResult<(NodeIx, NodeKind)> {
        self.lookup(id.as_str())
            .and_then(|ix| self.slot(ix).map(|s| (ix, s.kind)))
            .ok_or_else(|| AuthzError::UnknownNode(id.to_string()))
    }

    fn insert_edge(&mut self, registry: &TypeRegistry, edge: &Edge) -> AuthzResult<bool> {
        let (source, source_kind) = self.resolve(&edge.source)?;
        let (target, target_kind) = self.resolve(&edge.target)?;
        registry.validate(edge, source_kind, target_kind)?;

        let forward = Link {
            node: target,
            role: edge.role.clone(),
        };
        if self
            .slot(source)
            .is_some_and(|s| s.out.contains(edge.kind, &forward))
        {
            return Ok(false);
        }
        let backward = Link {
            node: source,
            role: edge.role.clone(),
        };

        if let Some(slot) = self.slot_mut(source) {
            slot.out.insert(edge.kind, forward);
        }
        if let Some(slot) = self.slot_mut(target) {
            slot.inc.insert(edge.kind, backward);
        }
        self.edge_count += 1;
        Ok(true)
    }

    fn delete_edge(&mut self, edge: &Edge) -> bool {
        let (Ok((source, _)), Ok((target, _))) =
            (self.resolve(&edge.source), self.resolve(&edge.target))
        else {
            return false;
        };
        let forward = Link {
            node: target,
            role: edge.role.clone(),
        };
        if !self
            .slot(source)
            .is_some_and(|s| s.out.contains(edge.kind, &forward))
        {
            return false;
        }
        let backward = Link {
            node: source,
            role: edge.role.clone(),
        };

        if let Some(slot) = self.slot_mut(source) {
            slot.out.remove(edge.kind, &forward);
        }
        if let Some(slot) = self.slot_mut(target) {
            slot.inc.remove(edge.kind, &backward);
        }
        self.edge_count -= 1;
        true
    }

    fn delete_node(&mut self, id: &str) -> bool {
        let Some(ix) = self.lookup(id) else {
            return false;
        };
        let Some(removed) = self.slots.get_mut(ix as usize).and_then(Option::take) else {
            return false;
        };

        // Self-loops show up in both directions; count them on the forward side only.
        for (kind, link) in removed.out.iter() {
            self.edge_count -= 1;
            if link.node == ix {
                continue;
            }
            let back = Link {
                node: ix,
                role: link.role.clone(),
            };
            if let Some(neighbor) = self.slot_mut(link.node) {
                neighbor.inc.remove(kind, &back);
            }
        }
        for (kind, link) in removed.inc.iter() {
            if link.node == ix {
                continue;
            }
            self.edge_count -= 1;
            let back = Link {
                node: ix,
                role: link.role.clone(),
            };
            if let Some(neighbor) = self.slot_mut(link.node) {
                neighbor.out.remove(kind, &back);
            }
        }

        self.index.remove(id);
        self.free.push_back(ix);
        true
    }
}

/// Authoritative, versioned owner of the graph.
///
/// Writers are serialized by an internal mutex. Every state-changing mutation
/// bumps the version and publishes an immutable copy that readers pick up
/// without touching the writer lock.
#[derive(Debug)]
pub struct GraphStore {
    registry: TypeRegistry,
    working: Mutex<GraphState>,
    published: ArcSwap<GraphState>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::with_registry(TypeRegistry::default())
    }

    pub fn with_registry(registry: TypeRegistry) -> Self {
        Self {
            registry,
            working: Mutex::new(GraphState::default()),
            published: ArcSwap::from_pointee(GraphState::default()),
        }
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Add a node. Re-adding an existing id with the same kind is a no-op.
    pub fn add_node(&self, id: impl Into<NodeId>, kind: NodeKind) -> AuthzResult<MutationOutcome> {
        let id = id.into();
        let outcome = self.mutate(|state, _| state.insert_node(id.clone(), kind));
        match &outcome {
            Ok(o) if o.changed => tracing::debug!(%id, %kind, version = o.version, "added node"),
            Ok(_) => {}
            Err(e) => tracing::warn!(%id, %kind, error = %e, "rejected node"),
        }
        outcome
    }

    /// Add an edge between two existing nodes. Re-adding an identical edge is a no-op.
    pub fn add_edge(&self, edge: Edge) -> AuthzResult<MutationOutcome> {
        let outcome = self.mutate(|state, registry| state.insert_edge(registry, &edge));
        match &outcome {
            Ok(o) if o.changed => tracing::debug!(%edge, version = o.version, "added edge"),
            Ok(_) => {}
            Err(e) => tracing::warn!(%edge, error = %e, "rejected edge"),
        }
        outcome
    }

    /// Remove a node and every edge touching it. Removing an absent id is a no-op.
    pub fn remove_node(&self, id: &str) -> MutationOutcome {
        let outcome = self.mutate_infallible(|state| state.delete_node(id));
        if outcome.changed {
            tracing::debug!(id, version = outcome.version, "removed node");
        }
        outcome
    }

    /// Remove an edge. Removing an absent edge is a no-op.
    pub fn remove_edge(&self, edge: &Edge) -> MutationOutcome {
        let outcome = self.mutate_infallible(|state| state.delete_edge(edge));
        if outcome.changed {
            tracing::debug!(%edge, version = outcome.version, "removed edge");
        }
        outcome
    }

    pub fn current_version(&self) -> u64 {
        self.published.load().version
    }

    pub fn node_count(&self) -> usize {
        self.published.load().node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.published.load().edge_count()
    }

    /// The most recently committed state.
    pub(crate) fn published(&self) -> Arc<GraphState> {
        self.published.load_full()
    }

    fn mutate<F>(&self, f: F) -> AuthzResult<MutationOutcome>
    where
        F: FnOnce(&mut GraphState, &TypeRegistry) -> AuthzResult<bool>,
    {
        let mut working = self.working.lock();
        let changed = f(&mut working, &self.registry)?;
        if changed {
            working.version += 1;
            self.published.store(Arc::new(working.clone()));
        }
        Ok(MutationOutcome {
            version: working.version,
            changed,
        })
    }

    fn mutate_infallible<F>(&self, f: F) -> MutationOutcome
    where
        F: FnOnce(&mut GraphState) -> bool,
    {
        let mut working = self.working.lock();
        let changed = f(&mut working);
        if changed {
            working.version += 1;
            self.published.store(Arc::new(working.clone()));
        }
        MutationOutcome {
            version: working.version,
            changed,
        }
    }
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}
