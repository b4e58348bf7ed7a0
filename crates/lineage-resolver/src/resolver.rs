use std::sync::{Mutex, MutexGuard, PoisonError};

use lineage_types::{ContentHash, EdgeRef, NodeRef};
use tracing::debug;

use crate::cache::{BoundedCache, DEFAULT_CACHE_CAPACITY};
use crate::error::{ResolveError, ResolveResult};
use crate::traits::DomainStore;

/// Maps graph nodes and edges back to live domain objects and actions.
///
/// Lookups go cache first, keyed by content hash, and fall back to the
/// domain store on a miss. Fetched values are cached. Objects and actions
/// each keep at most `capacity` entries, oldest evicted first. The lock is
/// never held across a store call.
pub struct ObjectResolver<D: DomainStore> {
    domain: D,
    objects: Mutex<BoundedCache<D::Object>>,
    actions: Mutex<BoundedCache<D::Action>>,
}

// A poisoned cache is still a valid cache: every entry was inserted whole.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<D: DomainStore> ObjectResolver<D> {
    pub fn new(domain: D) -> Self {
        Self::with_capacity(domain, DEFAULT_CACHE_CAPACITY)
    }

    /// A resolver caching at most `capacity` objects and `capacity` actions.
    pub fn with_capacity(domain: D, capacity: usize) -> Self {
        Self {
            domain,
            objects: Mutex::new(BoundedCache::new(capacity)),
            actions: Mutex::new(BoundedCache::new(capacity)),
        }
    }

    /// The domain store behind this resolver.
    pub fn domain(&self) -> &D {
        &self.domain
    }

    /// Cached object for `hash`, if any. Never touches the domain store.
    pub fn cached_object(&self, hash: &ContentHash) -> Option<D::Object> {
        lock(&self.objects).get(hash)
    }

    /// Cached action for `hash`, if any. Never touches the domain store.
    pub fn cached_action(&self, hash: &ContentHash) -> Option<D::Action> {
        lock(&self.actions).get(hash)
    }

    /// Seed the cache with an object already in hand.
    pub fn remember(&self, hash: ContentHash, object: D::Object) {
        lock(&self.objects).insert(hash, object);
    }

    /// Seed the cache with an action already in hand.
    pub fn remember_action(&self, hash: ContentHash, action: D::Action) {
        lock(&self.actions).insert(hash, action);
    }

    /// Evict one entry (object or action) from the cache.
    pub fn forget(&self, hash: &ContentHash) {
        lock(&self.objects).remove(hash);
        lock(&self.actions).remove(hash);
    }

    /// Total number of cached objects and actions.
    pub fn cache_len(&self) -> usize {
        lock(&self.objects).len() + lock(&self.actions).len()
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        lock(&self.objects).clear();
        lock(&self.actions).clear();
    }

    /// Resolve a node to the domain object it mirrors.
    ///
    /// Fails with [`ResolveError::NotFound`] when the domain store no longer
    /// has the object, i.e. the node is stale.
    pub async fn resolve(&self, node: &NodeRef) -> ResolveResult<D::Object> {
        if let Some(hit) = self.cached_object(&node.content_hash) {
            return Ok(hit);
        }

        debug!(node = %node.content_hash.short_hex(), "resolver cache miss");
        let fetched = self
            .domain
            .fetch_object(&node.class_tag, &node.external_id)
            .await?
            .ok_or_else(|| ResolveError::NotFound {
                class_tag: node.class_tag.clone(),
                external_id: node.external_id.clone(),
            })?;
        self.remember(node.content_hash, fetched.clone());
        Ok(fetched)
    }

    /// Resolve an edge to the domain action it mirrors.
    pub async fn resolve_action(&self, edge: &EdgeRef) -> ResolveResult<D::Action> {
        if let Some(hit) = self.cached_action(&edge.act_hash) {
            return Ok(hit);
        }

        debug!(edge = %edge.act_hash.short_hex(), "resolver cache miss");
        let fetched = self
            .domain
            .fetch_action(&edge.act_type, &edge.act_id)
            .await?
            .ok_or_else(|| ResolveError::NotFound {
                class_tag: edge.act_type.clone(),
                external_id: edge.act_id.clone(),
            })?;
        self.remember_action(edge.act_hash, fetched.clone());
        Ok(fetched)
    }
}

impl<D: DomainStore> std::fmt::Debug for ObjectResolver<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectResolver")
            .field("cached", &self.cache_len())
            .finish()
    }
}
