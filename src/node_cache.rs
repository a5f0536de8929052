//! Unit snapshot cache using moka
//!
//! Holds restricted-projection Unit snapshots keyed by id, used on the write
//! path to look up parents. Entries expire after an idle period (each hit
//! refreshes it) and the cache is bounded in size with LRU eviction.
//!
//! Misses are never cached: every miss goes back to the store.

use crate::error::MetaResult;
use crate::filter::{Filter, Projection};
use crate::storage::DocumentStore;
use crate::types::Collection;
use crate::unit::{Unit, UNIT_VITAM_FIELDS};
use moka::policy::EvictionPolicy;
use moka::sync::Cache;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

#[derive(Clone)]
pub struct NodeCache {
    inner: Cache<String, Arc<Unit>>,
}

impl NodeCache {
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        NodeCache {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_idle(ttl)
                .eviction_policy(EvictionPolicy::lru())
                .build(),
        }
    }

    /// Cached snapshot, or a fresh one fetched from the store.
    ///
    /// Returns `None` when the Unit does not exist.
    pub fn get(&self, id: &str, store: &dyn DocumentStore) -> MetaResult<Option<Arc<Unit>>> {
        if let Some(unit) = self.inner.get(id) {
            return Ok(Some(unit));
        }

        trace!(id, "node cache miss");
        let projection = Projection::include(UNIT_VITAM_FIELDS);
        let found = store.find_one(Collection::Units, &Filter::id_eq(id), &projection)?;
        match found {
            Some(doc) => {
                let unit = Arc::new(Unit::from_document(doc)?);
                self.inner.insert(id.to_string(), unit.clone());
                Ok(Some(unit))
            }
            None => Ok(None),
        }
    }

    /// Cached snapshot only, never touching the store
    pub fn peek(&self, id: &str) -> Option<Arc<Unit>> {
        self.inner.get(id)
    }

    pub fn put(&self, unit: Unit) {
        self.inner.insert(unit.id.clone(), Arc::new(unit));
    }

    pub fn remove(&self, id: &str) {
        self.inner.invalidate(id);
    }

    pub fn clear(&self) {
        self.inner.invalidate_all();
    }

    /// Approximate number of live entries
    pub fn entry_count(&self) -> u64 {
        self.inner.run_pending_tasks();
        self.inner.entry_count()
    }
}

impl std::fmt::Debug for NodeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeCache")
            .field("entries", &self.inner.entry_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryStore;
    use serde_json::json;

    fn store_with_unit(id: &str) -> MemoryStore {
        let store = MemoryStore::new();
        let doc = json!({"_id": id, "_min": 1, "_max": 1, "title": "kept out of cache"});
        store
            .insert_one(Collection::Units, doc.as_object().cloned().unwrap())
            .unwrap();
        store
    }

    #[test]
    fn test_miss_fetches_then_hits() {
        let store = store_with_unit("u1");
        let cache = NodeCache::new(100, Duration::from_secs(60));

        let unit = cache.get("u1", &store).unwrap().unwrap();
        assert_eq!(unit.id, "u1");
        assert!(unit.content.get("title").is_none());
        assert_eq!(store.stats().finds, 1);

        cache.get("u1", &store).unwrap().unwrap();
        assert_eq!(store.stats().finds, 1);
    }

    #[test]
    fn test_absence_not_cached() {
        let store = MemoryStore::new();
        let cache = NodeCache::new(100, Duration::from_secs(60));

        assert!(cache.get("ghost", &store).unwrap().is_none());
        assert!(cache.get("ghost", &store).unwrap().is_none());
        assert_eq!(store.stats().finds, 2);
    }

    #[test]
    fn test_remove_and_clear() {
        let store = store_with_unit("u1");
        let cache = NodeCache::new(100, Duration::from_secs(60));
        cache.get("u1", &store).unwrap();

        cache.remove("u1");
        assert!(cache.peek("u1").is_none());

        cache.put(Unit::new("u2"));
        cache.clear();
        assert!(cache.peek("u2").is_none());
    }
}
