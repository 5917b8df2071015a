// Bounded TTL cache for registry query results
//
// A single mutex-guarded map per value type. There is no background
// sweeper: expired entries are purged inline with writes, and when the
// map is at capacity the oldest-expiring quarter is evicted before the
// new entry goes in. This bounds memory regardless of query volume.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

/// A bounded, expiring key/value cache.
pub struct TtlCache<V> {
    entries: Mutex<HashMap<String, Entry<V>>>,
    ttl: Duration,
    max_entries: usize,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    /// Look up a live entry. Expired entries read as absent.
    pub fn get(&self, key: &str) -> Option<V> {
        let entries = self.entries.lock();
        let entry = entries.get(key)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        Some(entry.value.clone())
    }

    /// Insert a value under the cache's TTL, purging expired entries and
    /// evicting the oldest-expiring quarter if the map is full.
    pub fn insert(&self, key: impl Into<String>, value: V) {
        let key = key.into();
        let now = Instant::now();
        let mut entries = self.entries.lock();

        entries.retain(|_, e| e.expires_at > now);

        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            let evict = (self.max_entries / 4).max(1);
            let mut by_expiry: Vec<(String, Instant)> = entries
                .iter()
                .map(|(k, e)| (k.clone(), e.expires_at))
                .collect();
            by_expiry.sort_by_key(|(_, expires_at)| *expires_at);
            for (victim, _) in by_expiry.into_iter().take(evict) {
                entries.remove(&victim);
            }
            debug!(evicted = evict, "registry cache at capacity, evicted oldest entries");
        }

        entries.insert(
            key,
            Entry {
                value,
                expires_at: now + self.ttl,
            },
        );
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn round_trip_within_ttl() {
        let cache: TtlCache<u32> = TtlCache::new(Duration::from_secs(60), 16);
        cache.insert("k", 7);
        assert_eq!(cache.get("k"), Some(7));
        assert_eq!(cache.get("missing"), None);
    }

    #[test]
    fn expired_entries_read_as_absent() {
        let cache: TtlCache<u32> = TtlCache::new(Duration::from_millis(10), 16);
        cache.insert("k", 7);
        sleep(Duration::from_millis(25));
        assert_eq!(cache.get("k"), None);
    }

    #[test]
    fn writes_purge_expired_entries() {
        let cache: TtlCache<u32> = TtlCache::new(Duration::from_millis(10), 16);
        cache.insert("old", 1);
        sleep(Duration::from_millis(25));
        cache.insert("new", 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("new"), Some(2));
    }

    #[test]
    fn never_exceeds_capacity() {
        let cache: TtlCache<u32> = TtlCache::new(Duration::from_secs(60), 8);
        for i in 0..50 {
            cache.insert(format!("k{i}"), i);
            assert!(cache.len() <= 8, "cache grew past its bound");
        }
    }

    #[test]
    fn eviction_removes_a_quarter() {
        let cache: TtlCache<u32> = TtlCache::new(Duration::from_secs(60), 8);
        for i in 0..8 {
            cache.insert(format!("k{i}"), i);
        }
        assert_eq!(cache.len(), 8);
        cache.insert("overflow", 99);
        // 8 - (8 / 4) + 1 new entry
        assert_eq!(cache.len(), 7);
        assert_eq!(cache.get("overflow"), Some(99));
    }

    #[test]
    fn overwriting_existing_key_does_not_evict() {
        let cache: TtlCache<u32> = TtlCache::new(Duration::from_secs(60), 4);
        for i in 0..4 {
            cache.insert(format!("k{i}"), i);
        }
        cache.insert("k0", 100);
        assert_eq!(cache.len(), 4);
        assert_eq!(cache.get("k0"), Some(100));
    }

    #[test]
    fn clear_empties_the_cache() {
        let cache: TtlCache<u32> = TtlCache::new(Duration::from_secs(60), 4);
        cache.insert("k", 1);
        cache.clear();
        assert_eq!(cache.get("k"), None);
        assert_eq!(cache.len(), 0);
    }
}
