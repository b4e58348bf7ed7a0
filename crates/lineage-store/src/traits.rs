use std::sync::Arc;

use async_trait::async_trait;
use lineage_types::{ContentHash, Direction, EdgeAttrs, EdgeRef, NodeAttrs, NodeRef};

use crate::error::GraphResult;

/// Hash-indexed access to an external graph database.
///
/// All implementations must satisfy these invariants:
/// - `get_or_create_node` and `create_edge` are atomic in the store. Two
///   writers racing on the same hash end up with one entity between them.
/// - Lookups report [`GraphError::Integrity`] rather than picking one when
///   a hash matches more than one entity.
/// - An edge is never visible with only one endpoint materialized.
/// - Nodes and edges are never updated or deleted.
///
/// [`GraphError::Integrity`]: crate::GraphError::Integrity
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Verify that the store is reachable.
    async fn ping(&self) -> GraphResult<()>;

    /// Return the node keyed by `hash`, creating it from `attrs` if absent.
    ///
    /// Attributes of an existing node are left untouched.
    async fn get_or_create_node(
        &self,
        hash: &ContentHash,
        attrs: &NodeAttrs,
    ) -> GraphResult<NodeRef>;

    /// Look up a node by content hash.
    ///
    /// Returns `Ok(None)` if no node has this hash.
    async fn find_node_by_hash(&self, hash: &ContentHash) -> GraphResult<Option<NodeRef>>;

    /// Look up an edge by action hash.
    ///
    /// Returns `Ok(None)` if no edge has this hash.
    async fn find_edge_by_hash(&self, hash: &ContentHash) -> GraphResult<Option<EdgeRef>>;

    /// Create a "produces" edge from `src` to `dst`.
    ///
    /// Fails with [`GraphError::UnmappedNode`] if either endpoint does not
    /// exist when the call reaches the store. If an edge with the same action
    /// hash already connects the same endpoints it is returned unchanged.
    ///
    /// [`GraphError::UnmappedNode`]: crate::GraphError::UnmappedNode
    async fn create_edge(
        &self,
        src: &NodeRef,
        dst: &NodeRef,
        attrs: &EdgeAttrs,
    ) -> GraphResult<EdgeRef>;

    /// Distinct nodes one "produces" hop away from `node` in `direction`.
    ///
    /// A node missing from the store has no neighbors.
    async fn neighbors(&self, node: &NodeRef, direction: Direction) -> GraphResult<Vec<NodeRef>>;

    /// Total number of nodes in the store.
    async fn node_count(&self) -> GraphResult<u64>;

    /// Up to `limit` nodes chosen at random.
    async fn sample_nodes(&self, limit: usize) -> GraphResult<Vec<NodeRef>>;
}

#[async_trait]
impl<G: GraphStore + ?Sized> GraphStore for Arc<G> {
    async fn ping(&self) -> GraphResult<()> {
        (**self).ping().await
    }

    async fn get_or_create_node(
        &self,
        hash: &ContentHash,
        attrs: &NodeAttrs,
    ) -> GraphResult<NodeRef> {
        (**self).get_or_create_node(hash, attrs).await
    }

    async fn find_node_by_hash(&self, hash: &ContentHash) -> GraphResult<Option<NodeRef>> {
        (**self).find_node_by_hash(hash).await
    }

    async fn find_edge_by_hash(&self, hash: &ContentHash) -> GraphResult<Option<EdgeRef>> {
        (**self).find_edge_by_hash(hash).await
    }

    async fn create_edge(
        &self,
        src: &NodeRef,
        dst: &NodeRef,
        attrs: &EdgeAttrs,
    ) -> GraphResult<EdgeRef> {
        (**self).create_edge(src, dst, attrs).await
    }

    async fn neighbors(&self, node: &NodeRef, direction: Direction) -> GraphResult<Vec<NodeRef>> {
        (**self).neighbors(node, direction).await
    }

    async fn node_count(&self) -> GraphResult<u64> {
        (**self).node_count().await
    }

    async fn sample_nodes(&self, limit: usize) -> GraphResult<Vec<NodeRef>> {
        (**self).sample_nodes(limit).await
    }
}
