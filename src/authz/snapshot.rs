use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::authz::errors::{AuthzError, AuthzResult};
use crate::authz::store::{GraphState, GraphStore, NodeIx};
use crate::authz::types::{Edge, EdgeKind, GraphRecord, NodeKind, NodeRecord};

/// Fixed-size bitset over the node indices of one state.
#[derive(Debug)]
pub(crate) struct VisitSet {
    words: Vec<u64>,
}

impl VisitSet {
    pub(crate) fn for_state(state: &GraphState) -> Self {
        Self {
            words: vec![0; state.capacity().div_ceil(64)],
        }
    }

    /// Returns `true` if `ix` was not yet present.
    pub(crate) fn insert(&mut self, ix: NodeIx) -> bool {
        let (word, bit) = (ix as usize / 64, 1u64 << (ix % 64));
        let Some(w) = self.words.get_mut(word) else {
            return false;
        };
        let fresh = *w & bit == 0;
        *w |= bit;
        fresh
    }

    pub(crate) fn contains(&self, ix: NodeIx) -> bool {
        self.words
            .get(ix as usize / 64)
            .is_some_and(|w| w & (1u64 << (ix % 64)) != 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    /// follow links stored in `out`
    Forward,
    /// follow links stored in `inc`
    Backward,
}

/// Breadth-first closure of `start` over `kind` links. The returned order
/// starts with `start` and lists every reachable node once. `tick` runs once
/// per dequeued node and once per examined link, and may abort the walk.
pub(crate) fn closure<F>(
    state: &GraphState,
    start: NodeIx,
    kind: EdgeKind,
    direction: Direction,
    mut tick: F,
) -> AuthzResult<(Vec<NodeIx>, VisitSet)>
where
    F: FnMut() -> AuthzResult<()>,
{
    let mut visited = VisitSet::for_state(state);
    let mut order = Vec::new();
    let mut queue = VecDeque::new();
    visited.insert(start);
    queue.push_back(start);

    while let Some(ix) = queue.pop_front() {
        tick()?;
        order.push(ix);
        let Some(slot) = state.slot(ix) else {
            continue;
        };
        let links = match direction {
            Direction::Forward => &slot.out,
            Direction::Backward => &slot.inc,
        };
        for link in links.links(kind) {
            tick()?;
            if visited.insert(link.node) {
                queue.push_back(link.node);
            }
        }
    }

    Ok((order, visited))
}

/// Immutable view of the graph at one version.
///
/// Cheap to clone and safe to share across threads. Results never change for
/// the lifetime of the handle, whatever writers do in the meantime.
#[derive(Debug, Clone)]
pub struct Snapshot {
    state: Arc<GraphState>,
}

impl Snapshot {
    pub(crate) fn state(&self) -> &GraphState {
        &self.state
    }

    pub fn version(&self) -> u64 {
        self.state.version
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state.lookup(id).is_some()
    }

    pub fn node_kind(&self, id: &str) -> Option<NodeKind> {
        self.state
            .lookup(id)
            .and_then(|ix| self.state.slot(ix))
            .map(|s| s.kind)
    }

    pub fn node_count(&self) -> usize {
        self.state.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.state.edge_count()
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeRecord> + '_ {
        self.state.slots().map(|(_, slot)| NodeRecord {
            id: slot.id.clone(),
            kind: slot.kind,
        })
    }

    /// Every node followed by its outgoing edges, in slot order. Lazy; call
    /// again to restart. The order is stable for a given snapshot.
    pub fn records(&self) -> impl Iterator<Item = GraphRecord> + '_ {
        let state = &*self.state;
        state.slots().flat_map(move |(_, slot)| {
            let node = GraphRecord::Node(NodeRecord {
                id: slot.id.clone(),
                kind: slot.kind,
            });
            let edges = slot
                .out
                .iter()
                .filter_map(move |(kind, link)| state.edge_from(slot, kind, link))
                .map(GraphRecord::Edge);
            std::iter::once(node).chain(edges)
        })
    }

    pub fn out_edges(&self, id: &str) -> AuthzResult<Vec<Edge>> {
        let ix = self.index_of(id)?;
        let Some(slot) = self.state.slot(ix) else {
            return Ok(Vec::new());
        };
        Ok(slot
            .out
            .iter()
            .filter_map(|(kind, link)| self.state.edge_from(slot, kind, link))
            .collect())
    }

    pub fn in_edges(&self, id: &str) -> AuthzResult<Vec<Edge>> {
        let ix = self.index_of(id)?;
        let Some(slot) = self.state.slot(ix) else {
            return Ok(Vec::new());
        };
        Ok(slot
            .inc
            .iter()
            .filter_map(|(kind, link)| {
                let source = self.state.slot(link.node)?;
                Some(Edge {
                    source: source.id.clone(),
                    target: slot.id.clone(),
                    kind,
                    role: link.role.clone(),
                })
            })
            .collect())
    }

    /// Direct children through `parent_of` edges.
    pub fn children(&self, id: &str) -> AuthzResult<Vec<NodeRecord>> {
        self.neighbors(id, Direction::Forward)
    }

    /// Direct parents through `parent_of` edges.
    pub fn parents(&self, id: &str) -> AuthzResult<Vec<NodeRecord>> {
        self.neighbors(id, Direction::Backward)
    }

    /// All resources above `id`, nearest first. Terminates on cycles; `id`
    /// itself is never included.
    pub fn ancestors(&self, id: &str) -> AuthzResult<Vec<NodeRecord>> {
        self.walk(id, Direction::Backward)
    }

    /// All resources below `id`, nearest first.
    pub fn descendants(&self, id: &str) -> AuthzResult<Vec<NodeRecord>> {
        self.walk(id, Direction::Forward)
    }

    pub(crate) fn index_of(&self, id: &str) -> AuthzResult<NodeIx> {
        self.state
            .lookup(id)
            .ok_or_else(|| AuthzError::UnknownNode(id.to_string()))
    }

    fn record(&self, ix: NodeIx) -> Option<NodeRecord> {
        self.state.slot(ix).map(|s| NodeRecord {
            id: s.id.clone(),
            kind: s.kind,
        })
    }

    fn neighbors(&self, id: &str, direction: Direction) -> AuthzResult<Vec<NodeRecord>> {
        let ix = self.index_of(id)?;
        let Some(slot) = self.state.slot(ix) else {
            return Ok(Vec::new());
        };
        let links = match direction {
            Direction::Forward => &slot.out,
            Direction::Backward => &slot.inc,
        };
        Ok(links
            .links(EdgeKind::ParentOf)
            .filter_map(|l| self.record(l.node))
            .collect())
    }

    fn walk(&self, id: &str, direction: Direction) -> AuthzResult<Vec<NodeRecord>> {
        let start = self.index_of(id)?;
        let (order, _) = closure(&self.state, start, EdgeKind::ParentOf, direction, || Ok(()))?;
        Ok(order
            .into_iter()
            .filter(|ix| *ix != start)
            .filter_map(|ix| self.record(ix))
            .collect())
    }
}

/// Hands out snapshots of a [`GraphStore`].
///
/// Snapshots of superseded versions stay reachable through [`at`](Self::at)
/// for as long as somebody holds them, and are dropped afterwards.
#[derive(Debug)]
pub struct SnapshotManager {
    store: Arc<GraphStore>,
    handed_out: Mutex<BTreeMap<u64, Weak<GraphState>>>,
    /// Version most recently entered in `handed_out`.
    last_registered: AtomicU64,
}

impl SnapshotManager {
    pub fn new(store: Arc<GraphStore>) -> Self {
        Self {
            store,
            handed_out: Mutex::new(BTreeMap::new()),
            last_registered: AtomicU64::new(u64::MAX),
        }
    }

    pub fn store(&self) -> &Arc<GraphStore> {
        &self.store
    }

    /// Snapshot of the latest committed version. Only the first call for a
    /// given version takes the registry lock.
    pub fn latest(&self) -> Snapshot {
        let state = self.store.published();
        if self.last_registered.load(Ordering::Acquire) != state.version {
            let mut handed_out = self.handed_out.lock();
            handed_out.retain(|_, w| w.strong_count() > 0);
            handed_out
                .entry(state.version)
                .or_insert_with(|| Arc::downgrade(&state));
            self.last_registered.store(state.version, Ordering::Release);
        }
        Snapshot { state }
    }

    /// Snapshot of a specific version, if it is the latest or still held elsewhere.
    pub fn at(&self, version: u64) -> AuthzResult<Snapshot> {
        let latest = self.latest();
        if latest.version() == version {
            return Ok(latest);
        }
        let handed_out = self.handed_out.lock();
        handed_out
            .get(&version)
            .and_then(Weak::upgrade)
            .map(|state| Snapshot { state })
            .ok_or(AuthzError::SnapshotUnavailable {
                requested: version,
                latest: latest.version(),
            })
    }

    /// Versions that currently have a live snapshot.
    pub fn live_versions(&self) -> Vec<u64> {
        let mut handed_out = self.handed_out.lock();
        handed_out.retain(|_, w| w.strong_count() > 0);
        handed_out.keys().copied().collect()
    }
}
