use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use lineage_types::{ContentHash, Direction, EdgeAttrs, EdgeRef, EndpointRole, NodeAttrs, NodeRef};
use rand::seq::SliceRandom;
use tracing::debug;

use crate::error::{EntityKind, GraphError, GraphResult};
use crate::traits::GraphStore;

/// In-memory graph store backed by adjacency lists.
///
/// Intended for tests and embedding. Every mutation happens under a single
/// write lock, which is what makes get-or-create and edge creation atomic
/// here. Entities are kept in insertion order; the hash indexes map to
/// positions so that duplicate keys (only reachable through
/// [`insert_node_unchecked`]) stay observable.
///
/// [`insert_node_unchecked`]: InMemoryGraphStore::insert_node_unchecked
pub struct InMemoryGraphStore {
    state: RwLock<GraphState>,
    reachable: AtomicBool,
}

#[derive(Default)]
struct GraphState {
    nodes: Vec<NodeRef>,
    edges: Vec<EdgeRef>,
    node_index: HashMap<ContentHash, Vec<usize>>,
    edge_index: HashMap<ContentHash, Vec<usize>>,
    /// node hash -> positions of edges leaving it
    outgoing: HashMap<ContentHash, Vec<usize>>,
    /// node hash -> positions of edges entering it
    incoming: HashMap<ContentHash, Vec<usize>>,
}

impl GraphState {
    fn node(&self, hash: &ContentHash) -> GraphResult<Option<&NodeRef>> {
        match self.node_index.get(hash).map(Vec::as_slice) {
            None | Some([]) => Ok(None),
            Some([only]) => Ok(self.nodes.get(*only)),
            Some(many) => Err(GraphError::duplicate(EntityKind::Node, *hash, many.len())),
        }
    }

    fn edge(&self, hash: &ContentHash) -> GraphResult<Option<&EdgeRef>> {
        match self.edge_index.get(hash).map(Vec::as_slice) {
            None | Some([]) => Ok(None),
            Some([only]) => Ok(self.edges.get(*only)),
            Some(many) => Err(GraphError::duplicate(EntityKind::Edge, *hash, many.len())),
        }
    }

    fn push_node(&mut self, node: NodeRef) {
        let pos = self.nodes.len();
        self.node_index
            .entry(node.content_hash)
            .or_default()
            .push(pos);
        self.nodes.push(node);
    }

    fn push_edge(&mut self, edge: EdgeRef) {
        let pos = self.edges.len();
        self.edge_index.entry(edge.act_hash).or_default().push(pos);
        self.outgoing.entry(edge.source).or_default().push(pos);
        self.incoming.entry(edge.target).or_default().push(pos);
        self.edges.push(edge);
    }
}

impl InMemoryGraphStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(GraphState::default()),
            reachable: AtomicBool::new(true),
        }
    }

    /// Number of nodes currently stored.
    pub fn node_len(&self) -> usize {
        self.read().map(|s| s.nodes.len()).unwrap_or(0)
    }

    /// Number of edges currently stored.
    pub fn edge_len(&self) -> usize {
        self.read().map(|s| s.edges.len()).unwrap_or(0)
    }

    /// How many nodes carry `hash`.
    pub fn node_multiplicity(&self, hash: &ContentHash) -> usize {
        self.read()
            .map(|s| s.node_index.get(hash).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    /// How many edges carry `hash`.
    pub fn edge_multiplicity(&self, hash: &ContentHash) -> usize {
        self.read()
            .map(|s| s.edge_index.get(hash).map_or(0, Vec::len))
            .unwrap_or(0)
    }

    /// Toggle reachability. While unreachable every operation fails with
    /// [`GraphError::Connectivity`].
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Append a node without the uniqueness check.
    ///
    /// This deliberately breaks the one-node-per-hash invariant and exists to
    /// reproduce corrupted stores.
    pub fn insert_node_unchecked(&self, node: NodeRef) {
        if let Ok(mut state) = self.write() {
            state.push_node(node);
        }
    }

    fn ensure_reachable(&self) -> GraphResult<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(GraphError::Connectivity("in-memory store marked unreachable".into()))
        }
    }

    fn read(&self) -> GraphResult<RwLockReadGuard<'_, GraphState>> {
        self.state
            .read()
            .map_err(|e| GraphError::Backend(format!("lock poisoned: {e}")))
    }

    fn write(&self) -> GraphResult<RwLockWriteGuard<'_, GraphState>> {
        self.state
            .write()
            .map_err(|e| GraphError::Backend(format!("lock poisoned: {e}")))
    }
}

impl Default for InMemoryGraphStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn ping(&self) -> GraphResult<()> {
        self.ensure_reachable()
    }

    async fn get_or_create_node(
        &self,
        hash: &ContentHash,
        attrs: &NodeAttrs,
    ) -> GraphResult<NodeRef> {
        self.ensure_reachable()?;
        let mut state = self.write()?;
        if let Some(existing) = state.node(hash)? {
            return Ok(existing.clone());
        }
        let node = NodeRef::new(*hash, attrs);
        debug!(node = %hash.short_hex(), class = %attrs.class_tag, "created graph node");
        state.push_node(node.clone());
        Ok(node)
    }

    async fn find_node_by_hash(&self, hash: &ContentHash) -> GraphResult<Option<NodeRef>> {
        self.ensure_reachable()?;
        let state = self.read()?;
        Ok(state.node(hash)?.cloned())
    }

    async fn find_edge_by_hash(&self, hash: &ContentHash) -> GraphResult<Option<EdgeRef>> {
        self.ensure_reachable()?;
        let state = self.read()?;
        Ok(state.edge(hash)?.cloned())
    }

    async fn create_edge(
        &self,
        src: &NodeRef,
        dst: &NodeRef,
        attrs: &EdgeAttrs,
    ) -> GraphResult<EdgeRef> {
        self.ensure_reachable()?;
        let mut state = self.write()?;

        if state.node(&src.content_hash)?.is_none() {
            return Err(GraphError::UnmappedNode {
                role: EndpointRole::Source,
                hash: src.content_hash,
            });
        }
        if state.node(&dst.content_hash)?.is_none() {
            return Err(GraphError::UnmappedNode {
                role: EndpointRole::Destination,
                hash: dst.content_hash,
            });
        }

        if let Some(existing) = state.edge(&attrs.act_hash)? {
            if existing.source == src.content_hash && existing.target == dst.content_hash {
                return Ok(existing.clone());
            }
            return Err(GraphError::Conflict {
                kind: EntityKind::Edge,
                hash: attrs.act_hash,
                reason: format!(
                    "already connects {} -> {}",
                    existing.source.short_hex(),
                    existing.target.short_hex()
                ),
            });
        }

        let edge = EdgeRef::new(attrs, src.content_hash, dst.content_hash);
        debug!(
            edge = %attrs.act_hash.short_hex(),
            source = %src.content_hash.short_hex(),
            target = %dst.content_hash.short_hex(),
            "created graph edge"
        );
        state.push_edge(edge.clone());
        Ok(edge)
    }

    async fn neighbors(&self, node: &NodeRef, direction: Direction) -> GraphResult<Vec<NodeRef>> {
        self.ensure_reachable()?;
        let state = self.read()?;
        let hash = node.content_hash;

        let mut adjacent: Vec<ContentHash> = Vec::new();
        if direction.follows_outgoing() {
            if let Some(positions) = state.outgoing.get(&hash) {
                adjacent.extend(
                    positions
                        .iter()
                        .filter_map(|&p| state.edges.get(p))
                        .map(|e| e.target),
                );
            }
        }
        if direction.follows_incoming() {
            if let Some(positions) = state.incoming.get(&hash) {
                adjacent.extend(
                    positions
                        .iter()
                        .filter_map(|&p| state.edges.get(p))
                        .map(|e| e.source),
                );
            }
        }

        let mut seen = HashSet::new();
        let mut result = Vec::new();
        for neighbor in adjacent {
            if !seen.insert(neighbor) {
                continue;
            }
            if let Some(n) = state.node(&neighbor)? {
                result.push(n.clone());
            }
        }
        Ok(result)
    }

    async fn node_count(&self) -> GraphResult<u64> {
        self.ensure_reachable()?;
        Ok(self.read()?.nodes.len() as u64)
    }

    async fn sample_nodes(&self, limit: usize) -> GraphResult<Vec<NodeRef>> {
        self.ensure_reachable()?;
        let state = self.read()?;
        let mut rng = rand::thread_rng();
        Ok(state
            .nodes
            .choose_multiple(&mut rng, limit)
            .cloned()
            .collect())
    }
}

impl std::fmt::Debug for InMemoryGraphStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryGraphStore")
            .field("node_count", &self.node_len())
            .field("edge_count", &self.edge_len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use lineage_types::compute_hash;

    fn attrs(class_tag: &str, id: &str) -> (ContentHash, NodeAttrs) {
        (compute_hash(class_tag, id).unwrap(), NodeAttrs::new(class_tag, id))
    }

    fn action(id: &str) -> EdgeAttrs {
        EdgeAttrs {
            act_type: "Action".into(),
            act_id: id.into(),
            act_hash: compute_hash("Action", id).unwrap(),
        }
    }

    async fn node(store: &InMemoryGraphStore, class_tag: &str, id: &str) -> NodeRef {
        let (hash, a) = attrs(class_tag, id);
        store.get_or_create_node(&hash, &a).await.unwrap()
    }

    // -----------------------------------------------------------------------
    // Nodes
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn get_or_create_is_idempotent() {
        let store = InMemoryGraphStore::new();
        let first = node(&store, "DataSample", "V1").await;
        let second = node(&store, "DataSample", "V1").await;
        assert_eq!(first, second);
        assert_eq!(store.node_len(), 1);
        assert_eq!(store.node_multiplicity(&first.content_hash), 1);
    }

    #[tokio::test]
    async fn existing_node_attrs_are_not_overwritten() {
        let store = InMemoryGraphStore::new();
        let (hash, a) = attrs("DataSample", "V1");
        store.get_or_create_node(&hash, &a).await.unwrap();
        let other = store
            .get_or_create_node(&hash, &NodeAttrs::new("Renamed", "V9"))
            .await
            .unwrap();
        assert_eq!(other.class_tag, "DataSample");
    }

    #[tokio::test]
    async fn find_missing_node_returns_none() {
        let store = InMemoryGraphStore::new();
        let (hash, _) = attrs("DataSample", "ghost");
        assert!(store.find_node_by_hash(&hash).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_nodes_are_an_integrity_error() {
        let store = InMemoryGraphStore::new();
        let n = node(&store, "DataSample", "V1").await;
        store.insert_node_unchecked(n.clone());
        let err = store.find_node_by_hash(&n.content_hash).await.unwrap_err();
        assert!(matches!(
            err,
            GraphError::Integrity { kind: EntityKind::Node, count: 2, .. }
        ));
    }

    #[tokio::test]
    async fn concurrent_creation_yields_one_node() {
        let store = Arc::new(InMemoryGraphStore::new());
        let (hash, a) = attrs("DataSample", "V-shared");
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = Arc::clone(&store);
                let a = a.clone();
                tokio::spawn(async move { store.get_or_create_node(&hash, &a).await.unwrap() })
            })
            .collect();
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(store.node_multiplicity(&hash), 1);
    }

    // -----------------------------------------------------------------------
    // Edges
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn create_edge_between_existing_nodes() {
        let store = InMemoryGraphStore::new();
        let a = node(&store, "Study", "S1").await;
        let b = node(&store, "DataSample", "V1").await;
        let edge = store.create_edge(&a, &b, &action("P1")).await.unwrap();
        assert_eq!(edge.source, a.content_hash);
        assert_eq!(edge.target, b.content_hash);

        let found = store.find_edge_by_hash(&edge.act_hash).await.unwrap();
        assert_eq!(found, Some(edge));
    }

    #[tokio::test]
    async fn create_edge_is_idempotent() {
        let store = InMemoryGraphStore::new();
        let a = node(&store, "Study", "S1").await;
        let b = node(&store, "DataSample", "V1").await;
        let e1 = store.create_edge(&a, &b, &action("P1")).await.unwrap();
        let e2 = store.create_edge(&a, &b, &action("P1")).await.unwrap();
        assert_eq!(e1, e2);
        assert_eq!(store.edge_len(), 1);
    }

    #[tokio::test]
    async fn reused_action_hash_with_other_endpoints_conflicts() {
        let store = InMemoryGraphStore::new();
        let a = node(&store, "Study", "S1").await;
        let b = node(&store, "DataSample", "V1").await;
        let c = node(&store, "DataSample", "V2").await;
        store.create_edge(&a, &b, &action("P1")).await.unwrap();
        let err = store.create_edge(&a, &c, &action("P1")).await.unwrap_err();
        assert!(matches!(err, GraphError::Conflict { kind: EntityKind::Edge, .. }));
        assert_eq!(store.edge_len(), 1);
    }

    #[tokio::test]
    async fn missing_source_is_unmapped() {
        let store = InMemoryGraphStore::new();
        let (hash, a) = attrs("Study", "never-dumped");
        let ghost = NodeRef::new(hash, &a);
        let b = node(&store, "DataSample", "V1").await;
        let err = store.create_edge(&ghost, &b, &action("P1")).await.unwrap_err();
        match err {
            GraphError::UnmappedNode { role, hash: h } => {
                assert_eq!(role, EndpointRole::Source);
                assert_eq!(h, hash);
            }
            other => panic!("expected UnmappedNode, got {other:?}"),
        }
        assert_eq!(store.edge_len(), 0);
    }

    #[tokio::test]
    async fn missing_destination_is_unmapped() {
        let store = InMemoryGraphStore::new();
        let a = node(&store, "Study", "S1").await;
        let (hash, attrs_b) = attrs("DataSample", "never-dumped");
        let ghost = NodeRef::new(hash, &attrs_b);
        let err = store.create_edge(&a, &ghost, &action("P1")).await.unwrap_err();
        assert!(matches!(
            err,
            GraphError::UnmappedNode { role: EndpointRole::Destination, .. }
        ));
    }

    // -----------------------------------------------------------------------
    // Neighbors
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn neighbors_follow_direction() {
        let store = InMemoryGraphStore::new();
        let a = node(&store, "Study", "A").await;
        let b = node(&store, "DataSample", "B").await;
        let c = node(&store, "DataSample", "C").await;
        store.create_edge(&a, &b, &action("P1")).await.unwrap();
        store.create_edge(&b, &c, &action("P2")).await.unwrap();

        assert_eq!(store.neighbors(&b, Direction::Out).await.unwrap(), vec![c.clone()]);
        assert_eq!(store.neighbors(&b, Direction::In).await.unwrap(), vec![a.clone()]);
        let both = store.neighbors(&b, Direction::Both).await.unwrap();
        assert_eq!(both.len(), 2);
        assert!(both.contains(&a) && both.contains(&c));
    }

    #[tokio::test]
    async fn parallel_edges_yield_distinct_neighbors() {
        let store = InMemoryGraphStore::new();
        let a = node(&store, "Study", "A").await;
        let b = node(&store, "DataSample", "B").await;
        store.create_edge(&a, &b, &action("P1")).await.unwrap();
        store.create_edge(&a, &b, &action("P2")).await.unwrap();
        assert_eq!(store.neighbors(&a, Direction::Out).await.unwrap(), vec![b]);
    }

    #[tokio::test]
    async fn unknown_node_has_no_neighbors() {
        let store = InMemoryGraphStore::new();
        let (hash, a) = attrs("Study", "ghost");
        let ghost = NodeRef::new(hash, &a);
        assert!(store.neighbors(&ghost, Direction::Both).await.unwrap().is_empty());
    }

    // -----------------------------------------------------------------------
    // Counting, sampling, reachability
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn sample_is_bounded_by_limit_and_population() {
        let store = InMemoryGraphStore::new();
        for i in 0..5 {
            node(&store, "DataSample", &format!("V{i}")).await;
        }
        assert_eq!(store.node_count().await.unwrap(), 5);
        assert_eq!(store.sample_nodes(3).await.unwrap().len(), 3);
        assert_eq!(store.sample_nodes(50).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn unreachable_store_reports_connectivity() {
        let store = InMemoryGraphStore::new();
        store.set_reachable(false);
        assert!(matches!(store.ping().await, Err(GraphError::Connectivity(_))));
        let (hash, a) = attrs("Study", "S1");
        assert!(matches!(
            store.get_or_create_node(&hash, &a).await,
            Err(GraphError::Connectivity(_))
        ));
        store.set_reachable(true);
        assert!(store.ping().await.is_ok());
    }

    #[test]
    fn debug_format() {
        let store = InMemoryGraphStore::new();
        let debug = format!("{store:?}");
        assert!(debug.contains("InMemoryGraphStore"));
        assert!(debug.contains("node_count"));
    }
}
