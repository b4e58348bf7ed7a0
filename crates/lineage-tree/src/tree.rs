use std::collections::HashSet;

use lineage_resolver::{DomainStore, ObjectResolver};
use lineage_store::{GraphStore, Neo4jGraphStore};
use lineage_types::{ContentHash, EdgeAttrs, EdgeRef, EndpointRole, Identified, NodeAttrs, NodeRef};
use tracing::debug;

use crate::cancel::CancelToken;
use crate::config::TreeConfig;
use crate::consistency::{check_consistency, ConsistencyReport};
use crate::error::{TreeError, TreeResult};
use crate::query::ConnectedQuery;

/// Provenance graph over a [`GraphStore`], mirroring objects of a
/// [`DomainStore`].
///
/// Domain objects become nodes keyed by their content hash; actions become
/// "produces" edges from the object that fed the action to the object it
/// created. The tree holds no state of its own beyond the store handle and
/// the resolver cache, so it can be shared behind an `Arc`.
pub struct DependencyTree<G, D>
where
    G: GraphStore,
    D: DomainStore,
{
    store: G,
    resolver: ObjectResolver<D>,
    config: TreeConfig,
    consistency: ConsistencyReport,
}

impl<D: DomainStore> DependencyTree<Neo4jGraphStore, D> {
    /// Connect to the Neo4j server named in `config.graph` and run the
    /// startup consistency check.
    pub async fn open(config: TreeConfig, domain: D) -> TreeResult<Self> {
        let store = Neo4jGraphStore::connect(config.graph.clone()).await?;
        Self::with_store(store, domain, config).await
    }
}

impl<G, D> DependencyTree<G, D>
where
    G: GraphStore,
    D: DomainStore,
{
    /// Build a tree over an already-connected store.
    ///
    /// Fails with [`TreeError::Connectivity`] if the store does not answer
    /// and with [`TreeError::Integrity`] if it disagrees with the domain
    /// store.
    pub async fn with_store(store: G, domain: D, config: TreeConfig) -> TreeResult<Self> {
        let resolver = ObjectResolver::with_capacity(domain, config.cache_capacity);
        let consistency = check_consistency(&store, &resolver, &config.consistency).await?;
        Ok(Self {
            store,
            resolver,
            config,
            consistency,
        })
    }

    pub fn store(&self) -> &G {
        &self.store
    }

    pub fn resolver(&self) -> &ObjectResolver<D> {
        &self.resolver
    }

    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// Result of the consistency check run at construction.
    pub fn consistency_report(&self) -> &ConsistencyReport {
        &self.consistency
    }

    /// Place `object` in the graph, or return its existing node.
    pub async fn dump_node(&self, object: &D::Object) -> TreeResult<NodeRef> {
        let hash = object.content_hash()?;
        let attrs = NodeAttrs::new(object.class_tag(), object.external_id());
        let node = self.store.get_or_create_node(&hash, &attrs).await?;
        self.resolver.remember(hash, object.clone());
        debug!(node = %hash.short_hex(), class = %node.class_tag, "dumped node");
        Ok(node)
    }

    /// Record that `action` turned `source` into `dest`.
    ///
    /// Both objects must already be in the graph; otherwise this fails with
    /// [`TreeError::UnmappedNode`] naming the missing end. Dumping an action
    /// that is already present between the same objects returns the existing
    /// edge; one recorded between other objects is a [`TreeError::Integrity`].
    pub async fn dump_edge(
        &self,
        source: &D::Object,
        dest: &D::Object,
        action: &D::Action,
    ) -> TreeResult<EdgeRef> {
        let act_hash = action.content_hash()?;
        let src_hash = source.content_hash()?;
        let dst_hash = dest.content_hash()?;
        if let Some(existing) = self.store.find_edge_by_hash(&act_hash).await? {
            if existing.source != src_hash || existing.target != dst_hash {
                return Err(TreeError::Integrity(format!(
                    "action {act_hash} already connects {} -> {}, not {} -> {}",
                    existing.source.short_hex(),
                    existing.target.short_hex(),
                    src_hash.short_hex(),
                    dst_hash.short_hex()
                )));
            }
            debug!(edge = %act_hash.short_hex(), "edge already present");
            self.resolver.remember_action(act_hash, action.clone());
            return Ok(existing);
        }

        let src = self.mapped_node(src_hash, EndpointRole::Source).await?;
        let dst = self.mapped_node(dst_hash, EndpointRole::Destination).await?;
        let attrs = EdgeAttrs {
            act_type: action.class_tag().to_string(),
            act_id: action.external_id().to_string(),
            act_hash,
        };
        let edge = self.store.create_edge(&src, &dst, &attrs).await?;
        self.resolver.remember_action(act_hash, action.clone());
        debug!(
            edge = %act_hash.short_hex(),
            source = %src.content_hash.short_hex(),
            target = %dst.content_hash.short_hex(),
            "dumped edge"
        );
        Ok(edge)
    }

    async fn mapped_node(&self, hash: ContentHash, role: EndpointRole) -> TreeResult<NodeRef> {
        self.store
            .find_node_by_hash(&hash)
            .await?
            .ok_or(TreeError::UnmappedNode { role, hash })
    }

    /// Whether `object` has a node in the graph.
    pub async fn contains(&self, object: &D::Object) -> TreeResult<bool> {
        let hash = object.content_hash()?;
        Ok(self.store.find_node_by_hash(&hash).await?.is_some())
    }

    /// The edge recorded for `action`, if any.
    pub async fn find_action(&self, action: &D::Action) -> TreeResult<Option<EdgeRef>> {
        let hash = action.content_hash()?;
        Ok(self.store.find_edge_by_hash(&hash).await?)
    }

    /// Domain objects reachable from `object` under `query`.
    ///
    /// The start object is never part of the result. Order is unspecified.
    /// Fails with [`TreeError::NotFound`] if `object` has no node, or if a
    /// reached node no longer exists in the domain store.
    pub async fn get_connected(
        &self,
        object: &D::Object,
        query: &ConnectedQuery,
    ) -> TreeResult<Vec<D::Object>> {
        let cancel = self.effective_cancel(query);
        let nodes = self.traverse(object, query, &cancel).await?;

        let mut objects = Vec::with_capacity(nodes.len());
        for node in &nodes {
            objects.push(cancel.run(self.resolver.resolve(node)).await?);
        }
        Ok(objects)
    }

    /// Like [`get_connected`](Self::get_connected), without resolving the
    /// nodes back to domain objects.
    pub async fn connected_nodes(
        &self,
        object: &D::Object,
        query: &ConnectedQuery,
    ) -> TreeResult<Vec<NodeRef>> {
        let cancel = self.effective_cancel(query);
        self.traverse(object, query, &cancel).await
    }

    fn effective_cancel(&self, query: &ConnectedQuery) -> CancelToken {
        match (&query.cancel, self.config.default_query_timeout()) {
            (Some(token), _) => token.clone(),
            (None, Some(timeout)) => CancelToken::with_timeout(timeout),
            (None, None) => CancelToken::new(),
        }
    }

    // Breadth-first, one global visited set, so cycles terminate and every
    // node is expanded at most once.
    async fn traverse(
        &self,
        object: &D::Object,
        query: &ConnectedQuery,
        cancel: &CancelToken,
    ) -> TreeResult<Vec<NodeRef>> {
        let start_hash = object.content_hash()?;
        let start = cancel
            .run(self.store.find_node_by_hash(&start_hash))
            .await?
            .ok_or_else(|| {
                TreeError::NotFound(format!(
                    "no node for {}:{}",
                    object.class_tag(),
                    object.external_id()
                ))
            })?;

        let mut visited: HashSet<ContentHash> = HashSet::from([start.content_hash]);
        let mut frontier = vec![start];
        let mut found = Vec::new();
        let mut hops = 0;

        while !frontier.is_empty() && query.depth.map_or(true, |max| hops < max) {
            hops += 1;
            let mut next = Vec::new();
            for node in &frontier {
                let neighbors = cancel
                    .run(self.store.neighbors(node, query.direction))
                    .await?;
                next.extend(
                    neighbors
                        .into_iter()
                        .filter(|n| visited.insert(n.content_hash)),
                );
            }
            debug!(
                start = %start_hash.short_hex(),
                hop = hops,
                discovered = next.len(),
                "expanded frontier"
            );
            found.extend(next.iter().filter(|n| query.matches(n)).cloned());
            frontier = next;
        }

        Ok(found)
    }
}

impl<G, D> std::fmt::Debug for DependencyTree<G, D>
where
    G: GraphStore + std::fmt::Debug,
    D: DomainStore,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DependencyTree")
            .field("store", &self.store)
            .field("resolver", &self.resolver)
            .finish()
    }
}
