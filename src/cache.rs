//! Time-bounded memoization of backend query results.

use serde::{Serialize, de::DeserializeOwned};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);
pub const DEFAULT_MAX_ENTRIES: usize = 256;

struct CacheEntry {
    value: serde_json::Value,
    inserted_at: Instant,
}

/// Maps `(operation, serialized arguments)` to the last value computed for it.
///
/// Entries older than the TTL are treated as missing and dropped on lookup.
/// Every insert first sweeps expired entries; a new key is skipped while the
/// map is still at `max_entries` after the sweep.
pub struct QueryCache {
    entries: Mutex<HashMap<(String, String), CacheEntry>>,
    ttl: Duration,
    max_entries: usize,
}

impl QueryCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_max_entries(ttl, DEFAULT_MAX_ENTRIES)
    }

    pub fn with_max_entries(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            max_entries,
        }
    }

    pub async fn get<A, T>(&self, operation: &str, args: &A) -> Option<T>
    where
        A: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let key = cache_key(operation, args)?;
        let mut entries = self.entries.lock().await;
        let entry = entries.get(&key)?;
        if entry.inserted_at.elapsed() >= self.ttl {
            debug!(operation, "cache entry expired");
            entries.remove(&key);
            return None;
        }
        serde_json::from_value(entry.value.clone()).ok()
    }

    pub async fn insert<A, T>(&self, operation: &str, args: &A, value: &T)
    where
        A: Serialize + ?Sized,
        T: Serialize,
    {
        let Some(key) = cache_key(operation, args) else {
            return;
        };
        let value = match serde_json::to_value(value) {
            Ok(value) => value,
            Err(err) => {
                warn!(operation, "failed to serialize cache value: {err}");
                return;
            }
        };
        let mut entries = self.entries.lock().await;
        let evicted = self.sweep(&mut entries);
        if evicted > 0 {
            debug!(operation, evicted, "dropped expired cache entries");
        }
        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            warn!(operation, max_entries = self.max_entries, "cache full, result not memoized");
            return;
        }
        entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    /// Drops every expired entry and returns how many were removed.
    fn sweep(&self, entries: &mut HashMap<(String, String), CacheEntry>) -> usize {
        let before = entries.len();
        entries.retain(|_, entry| entry.inserted_at.elapsed() < self.ttl);
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

fn cache_key<A: Serialize + ?Sized>(operation: &str, args: &A) -> Option<(String, String)> {
    match serde_json::to_string(args) {
        Ok(args) => Some((operation.to_string(), args)),
        Err(err) => {
            warn!(operation, "failed to serialize cache key: {err}");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_value_within_ttl() {
        let cache = QueryCache::default();
        cache.insert("lifetime", &(), &42u64).await;
        assert_eq!(cache.get::<_, u64>("lifetime", &()).await, Some(42));
    }

    #[tokio::test]
    async fn keys_include_arguments() {
        let cache = QueryCache::default();
        cache.insert("funnel", &7u32, &1u64).await;
        cache.insert("funnel", &14u32, &2u64).await;
        assert_eq!(cache.get::<_, u64>("funnel", &7u32).await, Some(1));
        assert_eq!(cache.get::<_, u64>("funnel", &14u32).await, Some(2));
        assert_eq!(cache.get::<_, u64>("funnel", &30u32).await, None);
        assert_eq!(cache.get::<_, u64>("other", &7u32).await, None);
    }

    #[tokio::test]
    async fn expired_entries_are_dropped() {
        let cache = QueryCache::new(Duration::ZERO);
        cache.insert("lifetime", &(), &42u64).await;
        assert_eq!(cache.get::<_, u64>("lifetime", &()).await, None);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn stale_keys_do_not_accumulate() {
        let cache = QueryCache::new(Duration::ZERO);
        for day in 0..100u32 {
            cache.insert("funnel", &day, &1u64).await;
        }
        assert!(cache.len().await <= 1);
    }

    #[tokio::test]
    async fn live_entries_are_capped() {
        let cache = QueryCache::with_max_entries(DEFAULT_TTL, 3);
        for day in 0..10u32 {
            cache.insert("funnel", &day, &u64::from(day)).await;
        }
        assert_eq!(cache.len().await, 3);
        assert_eq!(cache.get::<_, u64>("funnel", &2u32).await, Some(2));
        assert_eq!(cache.get::<_, u64>("funnel", &9u32).await, None);

        // existing keys can still be refreshed at capacity
        cache.insert("funnel", &0u32, &42u64).await;
        assert_eq!(cache.get::<_, u64>("funnel", &0u32).await, Some(42));
    }
}
