//! # TTL Cache
//!
//! Shard-striped map whose entries expire after a fixed time-to-live.
//! Expiry is checked on read; there is no background sweeper, although
//! `purge_expired` is available for callers that want one.

use crate::time::{SystemTimeSource, TimeSource};
use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Entry<V> {
    value: V,
    expires_at: Instant,
}

pub struct TtlCache<K, V> {
    entries: DashMap<K, Entry<V>>,
    ttl: Duration,
    clock: Arc<dyn TimeSource>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemTimeSource))
    }

    #[must_use]
    pub fn with_clock(ttl: Duration, clock: Arc<dyn TimeSource>) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            clock,
        }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Live value for `key`; an expired entry is removed and reported as a miss.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        {
            let entry = self.entries.get(key)?;
            if entry.expires_at > now {
                return Some(entry.value.clone());
            }
        }
        self.entries.remove_if(key, |_, e| e.expires_at <= now);
        None
    }

    pub fn insert(&self, key: K, value: V) {
        self.insert_with_ttl(key, value, self.ttl);
    }

    pub fn insert_with_ttl(&self, key: K, value: V, ttl: Duration) {
        let expires_at = self.clock.now() + ttl;
        self.entries.insert(key, Entry { value, expires_at });
    }

    /// Drop one entry. Returns whether it was present.
    pub fn invalidate(&self, key: &K) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drop every entry whose key matches.
    pub fn invalidate_where(&self, mut predicate: impl FnMut(&K) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|k, _| !predicate(k));
        before.saturating_sub(self.entries.len())
    }

    /// Remove expired entries; returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, e| e.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    /// Entries currently stored, including not-yet-purged expired ones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualClock;

    fn cache(ttl_secs: u64) -> (TtlCache<String, u32>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        (
            TtlCache::with_clock(Duration::from_secs(ttl_secs), clock.clone()),
            clock,
        )
    }

    #[test]
    fn test_entry_lives_until_ttl() {
        let (cache, clock) = cache(60);
        cache.insert("a".into(), 1);

        clock.advance(Duration::from_secs(59));
        assert_eq!(cache.get(&"a".to_string()), Some(1));

        clock.advance(Duration::from_secs(1));
        assert_eq!(cache.get(&"a".to_string()), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_per_entry_ttl() {
        let (cache, clock) = cache(300);
        cache.insert_with_ttl("short".into(), 1, Duration::from_secs(30));
        cache.insert("long".into(), 2);

        clock.advance(Duration::from_secs(31));
        assert_eq!(cache.get(&"short".to_string()), None);
        assert_eq!(cache.get(&"long".to_string()), Some(2));
    }

    #[test]
    fn test_invalidate_and_invalidate_where() {
        let (cache, _) = cache(60);
        cache.insert("x:1".into(), 1);
        cache.insert("x:2".into(), 2);
        cache.insert("y:1".into(), 3);

        assert!(cache.invalidate(&"y:1".to_string()));
        assert!(!cache.invalidate(&"y:1".to_string()));
        assert_eq!(cache.invalidate_where(|k| k.starts_with("x:")), 2);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_purge_expired() {
        let (cache, clock) = cache(10);
        cache.insert("a".into(), 1);
        cache.insert_with_ttl("b".into(), 2, Duration::from_secs(100));
        clock.advance(Duration::from_secs(11));
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
    }
}
