use std::collections::{HashMap, VecDeque};

use lineage_types::ContentHash;

/// Default number of entries kept per cache table.
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// Hash-keyed cache holding at most `max_size` entries.
///
/// When full, inserting a new key evicts the oldest inserted one. `order`
/// always lists exactly the keys of `entries`, oldest first.
pub(crate) struct BoundedCache<V> {
    entries: HashMap<ContentHash, V>,
    order: VecDeque<ContentHash>,
    max_size: usize,
}

impl<V: Clone> BoundedCache<V> {
    pub(crate) fn new(max_size: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            max_size,
        }
    }

    pub(crate) fn get(&self, hash: &ContentHash) -> Option<V> {
        self.entries.get(hash).cloned()
    }

    pub(crate) fn insert(&mut self, hash: ContentHash, value: V) {
        if self.max_size == 0 {
            return;
        }
        if self.entries.insert(hash, value).is_some() {
            return;
        }
        self.order.push_back(hash);
        while self.entries.len() > self.max_size {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
    }

    pub(crate) fn remove(&mut self, hash: &ContentHash) {
        if self.entries.remove(hash).is_some() {
            self.order.retain(|h| h != hash);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lineage_types::compute_hash;

    fn h(id: &str) -> ContentHash {
        compute_hash("DataSample", id).unwrap()
    }

    #[test]
    fn evicts_oldest_when_full() {
        let mut cache = BoundedCache::new(2);
        cache.insert(h("V1"), 1);
        cache.insert(h("V2"), 2);
        cache.insert(h("V3"), 3);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&h("V1")), None);
        assert_eq!(cache.get(&h("V2")), Some(2));
        assert_eq!(cache.get(&h("V3")), Some(3));
    }

    #[test]
    fn reinsert_replaces_without_growing() {
        let mut cache = BoundedCache::new(2);
        cache.insert(h("V1"), 1);
        cache.insert(h("V1"), 10);
        cache.insert(h("V2"), 2);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&h("V1")), Some(10));
    }

    #[test]
    fn removed_key_is_not_evicted_twice() {
        let mut cache = BoundedCache::new(2);
        cache.insert(h("V1"), 1);
        cache.remove(&h("V1"));
        cache.insert(h("V2"), 2);
        cache.insert(h("V3"), 3);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(&h("V2")), Some(2));
    }

    #[test]
    fn zero_capacity_caches_nothing() {
        let mut cache = BoundedCache::new(0);
        cache.insert(h("V1"), 1);
        assert_eq!(cache.len(), 0);
    }
}
