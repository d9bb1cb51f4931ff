//! In-process entity cache.
//!
//! An LRU map per entity type. Capacity bounds memory only; correctness
//! still comes from explicit invalidation, entries never expire.

use std::num::NonZeroUsize;
use std::sync::RwLock;

use async_trait::async_trait;
use lru::LruCache;
use metrics::counter;

use crate::util::lock::{rw_read, rw_write};

use super::contract::{Cache, CacheError};
use super::keys::CacheKey;

const SOURCE: &str = "cache::store";
const METRIC_CACHE_EVICT_TOTAL: &str = "rgdps_cache_evict_total";

pub struct MemoryCache<V> {
    name: &'static str,
    entries: RwLock<LruCache<CacheKey, V>>,
}

impl<V: Clone> MemoryCache<V> {
    /// Creates a cache labelled `name` (used in metrics) holding up to `capacity` entries.
    pub fn new(name: &'static str, capacity: NonZeroUsize) -> Self {
        Self {
            name,
            entries: RwLock::new(LruCache::new(capacity)),
        }
    }

    pub fn peek(&self, key: &CacheKey) -> Option<V> {
        rw_read(&self.entries, SOURCE, "peek").peek(key).cloned()
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        rw_write(&self.entries, SOURCE, "clear").clear();
    }
}

#[async_trait]
impl<V> Cache<V> for MemoryCache<V>
where
    V: Clone + Send + Sync + 'static,
{
    async fn get(&self, key: &CacheKey) -> Result<Option<V>, CacheError> {
        Ok(rw_write(&self.entries, SOURCE, "get").get(key).cloned())
    }

    async fn set(&self, key: CacheKey, value: V) -> Result<(), CacheError> {
        let evicted = rw_write(&self.entries, SOURCE, "set").push(key.clone(), value);
        if let Some((evicted_key, _)) = evicted
            && evicted_key != key
        {
            counter!(METRIC_CACHE_EVICT_TOTAL, "entity" => self.name).increment(1);
        }
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<(), CacheError> {
        rw_write(&self.entries, SOURCE, "delete").pop(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use super::*;

    fn cache(capacity: usize) -> MemoryCache<String> {
        MemoryCache::new("test", NonZeroUsize::new(capacity).expect("non-zero"))
    }

    #[tokio::test]
    async fn roundtrip_and_delete() {
        let cache = cache(4);
        let key = CacheKey::from(1);

        assert!(cache.get(&key).await.unwrap().is_none());

        cache.set(key.clone(), "alice".to_string()).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap().as_deref(), Some("alice"));

        cache.set(key.clone(), "bob".to_string()).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap().as_deref(), Some("bob"));
        assert_eq!(cache.len(), 1);

        cache.delete(&key).await.unwrap();
        assert!(cache.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn least_recently_used_entry_is_evicted() {
        let cache = cache(2);
        cache.set(CacheKey::from(1), "one".to_string()).await.unwrap();
        cache.set(CacheKey::from(2), "two".to_string()).await.unwrap();

        // Touch 1 so 2 becomes the eviction candidate.
        assert!(cache.get(&CacheKey::from(1)).await.unwrap().is_some());
        cache.set(CacheKey::from(3), "three".to_string()).await.unwrap();

        assert!(cache.peek(&CacheKey::from(1)).is_some());
        assert!(cache.peek(&CacheKey::from(2)).is_none());
        assert!(cache.peek(&CacheKey::from(3)).is_some());
    }

    #[tokio::test]
    async fn recovers_from_poisoned_lock() {
        let cache = cache(2);

        let _ = catch_unwind(AssertUnwindSafe(|| {
            let _guard = cache
                .entries
                .write()
                .expect("entries lock should be acquired");
            panic!("poison entries lock");
        }));

        cache.set(CacheKey::from(1), "one".to_string()).await.unwrap();
        assert_eq!(cache.len(), 1);
    }
}
