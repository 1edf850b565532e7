//! Consume-once response cache.
//!
//! Keeps recent remote responses by query fingerprint. Each entry remembers
//! which track keys have already been served from it: a second read by the
//! same key is reported as a miss, so that key fetches fresh data, while
//! other keys issuing the identical query still share the cached body.

use std::collections::HashSet;
use std::num::NonZeroUsize;

use bridge_traits::TrackKey;
use bytes::Bytes;
use core_runtime::settings::MAX_CACHE_SIZE;
use lru::LruCache;
use parking_lot::Mutex;
use tracing::trace;

/// Result of [`ResponseCache::get`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    Hit(Bytes),
    Miss,
}

#[derive(Debug)]
struct CacheEntry {
    body: Bytes,
    consumers: HashSet<TrackKey>,
}

/// Bounded LRU map from query fingerprint to response body.
///
/// A capacity of zero disables caching: every lookup misses and nothing is
/// stored.
#[derive(Debug)]
pub struct ResponseCache {
    inner: Mutex<Option<LruCache<u64, CacheEntry>>>,
}

impl ResponseCache {
    /// Creates a cache holding up to `capacity` responses, clamped to `0..=50`.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Self::build(capacity)),
        }
    }

    fn build(capacity: usize) -> Option<LruCache<u64, CacheEntry>> {
        NonZeroUsize::new(capacity.min(MAX_CACHE_SIZE)).map(LruCache::new)
    }

    /// Look up `fingerprint` on behalf of `consumer`.
    pub fn get(&self, fingerprint: u64, consumer: TrackKey) -> CacheLookup {
        let mut guard = self.inner.lock();
        let Some(cache) = guard.as_mut() else {
            return CacheLookup::Miss;
        };

        let Some(entry) = cache.get_mut(&fingerprint) else {
            return CacheLookup::Miss;
        };

        if entry.consumers.contains(&consumer) {
            trace!(fingerprint, consumer = %consumer, "Cached response already consumed");
            entry.consumers.clear();
            return CacheLookup::Miss;
        }

        entry.consumers.insert(consumer);
        CacheLookup::Hit(entry.body.clone())
    }

    /// Store `body` under `fingerprint` as consumed by `consumer`.
    ///
    /// Replaces any previous entry and its consumer set.
    pub fn put(&self, fingerprint: u64, consumer: TrackKey, body: Bytes) {
        let mut guard = self.inner.lock();
        if let Some(cache) = guard.as_mut() {
            cache.put(
                fingerprint,
                CacheEntry {
                    body,
                    consumers: HashSet::from([consumer]),
                },
            );
        }
    }

    /// Change the capacity, evicting least recently used entries if needed.
    pub fn resize(&self, capacity: usize) {
        let mut guard = self.inner.lock();
        match (NonZeroUsize::new(capacity.min(MAX_CACHE_SIZE)), guard.as_mut()) {
            (Some(size), Some(cache)) => cache.resize(size),
            (Some(size), None) => *guard = Some(LruCache::new(size)),
            (None, _) => *guard = None,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().as_ref().map_or(0, |cache| cache.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner
            .lock()
            .as_ref()
            .map_or(0, |cache| cache.cap().get())
    }

    pub fn clear(&self) {
        if let Some(cache) = self.inner.lock().as_mut() {
            cache.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: TrackKey = TrackKey(1);
    const B: TrackKey = TrackKey(2);

    fn body(text: &'static str) -> Bytes {
        Bytes::from_static(text.as_bytes())
    }

    #[test]
    fn test_second_read_by_same_key_misses() {
        let cache = ResponseCache::new(4);
        cache.put(10, A, body("first"));

        assert_eq!(cache.get(10, A), CacheLookup::Miss);
        assert_eq!(cache.get(10, B), CacheLookup::Hit(body("first")));
    }

    #[test]
    fn test_other_keys_share_entry_until_repeat() {
        let cache = ResponseCache::new(4);
        cache.put(10, A, body("r"));

        assert_eq!(cache.get(10, B), CacheLookup::Hit(body("r")));
        assert_eq!(cache.get(10, TrackKey(3)), CacheLookup::Hit(body("r")));
        // B repeats: miss, and the consumer set is reset.
        assert_eq!(cache.get(10, B), CacheLookup::Miss);
        assert_eq!(cache.get(10, A), CacheLookup::Hit(body("r")));
    }

    #[test]
    fn test_put_resets_consumers() {
        let cache = ResponseCache::new(4);
        cache.put(10, A, body("old"));
        assert_eq!(cache.get(10, B), CacheLookup::Hit(body("old")));

        cache.put(10, A, body("new"));
        assert_eq!(cache.get(10, B), CacheLookup::Hit(body("new")));
    }

    #[test]
    fn test_lru_eviction() {
        let cache = ResponseCache::new(2);
        cache.put(1, A, body("1"));
        cache.put(2, A, body("2"));
        // Touch 1 so 2 becomes least recently used.
        assert!(matches!(cache.get(1, B), CacheLookup::Hit(_)));
        cache.put(3, A, body("3"));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(2, B), CacheLookup::Miss);
        assert!(matches!(cache.get(3, B), CacheLookup::Hit(_)));
    }

    #[test]
    fn test_zero_capacity_disables_cache() {
        let cache = ResponseCache::new(0);
        cache.put(1, A, body("x"));
        assert_eq!(cache.get(1, B), CacheLookup::Miss);
        assert!(cache.is_empty());
        assert_eq!(cache.capacity(), 0);
    }

    #[test]
    fn test_resize_clamps_and_evicts() {
        let cache = ResponseCache::new(3);
        cache.put(1, A, body("1"));
        cache.put(2, A, body("2"));
        cache.put(3, A, body("3"));

        cache.resize(1);
        assert_eq!(cache.len(), 1);
        assert!(matches!(cache.get(3, B), CacheLookup::Hit(_)));

        cache.resize(500);
        assert_eq!(cache.capacity(), MAX_CACHE_SIZE);

        cache.resize(0);
        assert_eq!(cache.capacity(), 0);
        cache.resize(5);
        assert_eq!(cache.capacity(), 5);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clear() {
        let cache = ResponseCache::new(3);
        cache.put(1, A, body("1"));
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.capacity(), 3);
    }
}
