//! Short-TTL in-process cache.
//!
//! Pure optimization over upstream calls; a flush never changes
//! correctness, only latency. Expiry is lazy on `get`, so no background
//! sweeper is required for correctness; `cleanup` exists only for memory
//! hygiene.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Default TTL for generic entries.
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Default TTL for full multi-page fetch results.
pub const FULL_FETCH_TTL: Duration = Duration::from_secs(300);

struct Entry<T> {
    value: T,
    expires_at: Instant,
}

/// TTL cache keyed by `platform:scope` strings.
pub struct MemoryCache<T> {
    entries: Mutex<HashMap<String, Entry<T>>>,
}

impl<T: Clone> Default for MemoryCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> MemoryCache<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the cached value, removing and missing it if the TTL has
    /// elapsed.
    pub fn get(&self, key: &str) -> Option<T> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Stores a value with the given TTL, measured from now.
    pub fn set(&self, key: impl Into<String>, value: T, ttl: Duration) {
        let mut entries = self.entries.lock();
        entries.insert(
            key.into(),
            Entry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Removes one entry.
    pub fn remove(&self, key: &str) {
        self.entries.lock().remove(key);
    }

    /// Evicts every expired entry, returning how many were removed.
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    /// Number of entries currently held, expired or not.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_get_within_ttl() {
        let cache = MemoryCache::new();
        cache.set("polymarket:markets", 7u32, Duration::from_secs(60));
        assert_eq!(cache.get("polymarket:markets"), Some(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_expires_lazily_without_cleanup() {
        let cache = MemoryCache::new();
        cache.set("k", 1u32, Duration::from_secs(60));

        tokio::time::advance(Duration::from_secs(61)).await;

        // No cleanup() call; get alone must report the entry gone.
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_refreshes_ttl() {
        let cache = MemoryCache::new();
        cache.set("k", 1u32, Duration::from_secs(60));
        tokio::time::advance(Duration::from_secs(50)).await;
        cache.set("k", 2u32, Duration::from_secs(60));
        tokio::time::advance(Duration::from_secs(50)).await;
        assert_eq!(cache.get("k"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_evicts_only_expired() {
        let cache = MemoryCache::new();
        cache.set("old", 1u32, Duration::from_secs(10));
        cache.set("fresh", 2u32, Duration::from_secs(100));

        tokio::time::advance(Duration::from_secs(11)).await;

        assert_eq!(cache.cleanup(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("fresh"), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove() {
        let cache = MemoryCache::new();
        cache.set("k", 1u32, Duration::from_secs(60));
        cache.remove("k");
        assert_eq!(cache.get("k"), None);
    }
}
