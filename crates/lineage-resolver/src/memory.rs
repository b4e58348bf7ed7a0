use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;
use lineage_types::Identified;
use serde::{Deserialize, Serialize};

use crate::error::{ResolveError, ResolveResult};
use crate::traits::DomainStore;

/// A minimal domain object: identity only.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DomainRecord {
    pub class_tag: String,
    pub external_id: String,
}

impl DomainRecord {
    pub fn new(class_tag: impl Into<String>, external_id: impl Into<String>) -> Self {
        Self {
            class_tag: class_tag.into(),
            external_id: external_id.into(),
        }
    }
}

impl Identified for DomainRecord {
    fn class_tag(&self) -> &str {
        &self.class_tag
    }

    fn external_id(&self) -> &str {
        &self.external_id
    }
}

type Key = (String, String);

fn key_of<T: Identified>(item: &T) -> Key {
    (item.class_tag().to_string(), item.external_id().to_string())
}

/// In-memory domain store for tests and embedding.
///
/// Counts fetches so callers can observe whether a lookup was served from a
/// cache in front of it.
pub struct InMemoryDomainStore<O = DomainRecord, A = DomainRecord> {
    objects: RwLock<HashMap<Key, O>>,
    actions: RwLock<HashMap<Key, A>>,
    fetches: AtomicUsize,
}

impl<O, A> InMemoryDomainStore<O, A>
where
    O: Identified + Clone + Send + Sync + 'static,
    A: Identified + Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            actions: RwLock::new(HashMap::new()),
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn insert_object(&self, object: O) {
        if let Ok(mut map) = self.objects.write() {
            map.insert(key_of(&object), object);
        }
    }

    pub fn insert_action(&self, action: A) {
        if let Ok(mut map) = self.actions.write() {
            map.insert(key_of(&action), action);
        }
    }

    /// Drop an object, leaving any graph node that mirrors it stale.
    pub fn remove_object(&self, class_tag: &str, external_id: &str) -> bool {
        self.objects
            .write()
            .map(|mut map| {
                map.remove(&(class_tag.to_string(), external_id.to_string()))
                    .is_some()
            })
            .unwrap_or(false)
    }

    /// Number of `fetch_object`/`fetch_action` calls served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl<O, A> Default for InMemoryDomainStore<O, A>
where
    O: Identified + Clone + Send + Sync + 'static,
    A: Identified + Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<O, A> DomainStore for InMemoryDomainStore<O, A>
where
    O: Identified + Clone + Send + Sync + 'static,
    A: Identified + Clone + Send + Sync + 'static,
{
    type Object = O;
    type Action = A;

    async fn fetch_object(&self, class_tag: &str, external_id: &str) -> ResolveResult<Option<O>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let map = self
            .objects
            .read()
            .map_err(|e| ResolveError::Domain(format!("lock poisoned: {e}")))?;
        Ok(map
            .get(&(class_tag.to_string(), external_id.to_string()))
            .cloned())
    }

    async fn fetch_action(&self, act_type: &str, act_id: &str) -> ResolveResult<Option<A>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let map = self
            .actions
            .read()
            .map_err(|e| ResolveError::Domain(format!("lock poisoned: {e}")))?;
        Ok(map.get(&(act_type.to_string(), act_id.to_string())).cloned())
    }

    async fn object_count(&self) -> ResolveResult<Option<u64>> {
        let map = self
            .objects
            .read()
            .map_err(|e| ResolveError::Domain(format!("lock poisoned: {e}")))?;
        Ok(Some(map.len() as u64))
    }
}
