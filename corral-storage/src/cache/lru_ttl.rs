//! LRU ordering with per-entry expiry.

use std::hash::Hash;
use std::num::NonZeroUsize;
use std::time::Duration;

use corral_core::{CacheConfig, ConfigError, CorralResult};
use lru::LruCache;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::stats::CacheStats;

/// A cached value and the instant it stops being valid.
#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V> CacheEntry<V> {
    fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

struct Inner<K: Hash + Eq, V> {
    /// Recency order: least recently used at the front.
    entries: LruCache<K, CacheEntry<V>>,
    hits: u64,
    misses: u64,
    evictions: u64,
}

/// Bounded key/value cache with TTL expiry and LRU eviction.
///
/// All operations take a single mutex. Reads reorder recency, so `get` is a
/// mutation as far as locking is concerned.
pub struct TtlLruCache<K: Hash + Eq, V> {
    inner: Mutex<Inner<K, V>>,
    capacity: NonZeroUsize,
    ttl: Duration,
}

impl<K, V> TtlLruCache<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Create a cache from configuration.
    ///
    /// Fails fast on a zero capacity.
    pub fn new(config: &CacheConfig) -> CorralResult<Self> {
        config.validate()?;
        let capacity =
            NonZeroUsize::new(config.capacity).ok_or_else(|| ConfigError::InvalidValue {
                field: "cache.capacity".to_string(),
                value: config.capacity.to_string(),
                reason: "capacity must be greater than 0".to_string(),
            })?;

        Ok(Self {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                hits: 0,
                misses: 0,
                evictions: 0,
            }),
            capacity,
            ttl: config.ttl,
        })
    }

    /// Look up a key.
    ///
    /// A fresh hit moves the key to the most-recent position. A stale entry
    /// is removed and reported as a miss.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        let fresh = inner.entries.peek(key).map(|entry| entry.is_fresh(now));
        match fresh {
            Some(true) => {
                inner.hits += 1;
                inner.entries.get(key).map(|entry| entry.value.clone())
            }
            Some(false) => {
                inner.entries.pop(key);
                inner.misses += 1;
                None
            }
            None => {
                inner.misses += 1;
                None
            }
        }
    }

    /// Read a fresh value without counting it or touching recency.
    pub fn peek(&self, key: &K) -> Option<V> {
        let now = Instant::now();
        self.inner
            .lock()
            .entries
            .peek(key)
            .filter(|entry| entry.is_fresh(now))
            .map(|entry| entry.value.clone())
    }

    /// Insert a value unless the key is already present.
    ///
    /// Presence is checked without regard to expiry: a stale entry still
    /// blocks the write. Returns whether the value was stored.
    pub fn set(&self, key: K, value: V) -> bool {
        let mut inner = self.inner.lock();
        if inner.entries.contains(&key) {
            return false;
        }

        if inner.entries.len() >= self.capacity.get() {
            match inner.entries.pop_lru() {
                Some(_) => inner.evictions += 1,
                None => unreachable!(
                    "cache reports {} entries at capacity {} but has no LRU entry",
                    inner.entries.len(),
                    self.capacity
                ),
            }
        }

        inner.entries.put(
            key,
            CacheEntry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
        true
    }

    /// Remove a key regardless of freshness, returning its value.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.inner.lock().entries.pop(key).map(|entry| entry.value)
    }

    /// Remove every entry whose TTL has elapsed. Counters are untouched.
    ///
    /// Returns the number of entries removed.
    pub fn sweep_stale(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        let stale: Vec<K> = inner
            .entries
            .iter()
            .filter(|(_, entry)| !entry.is_fresh(now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &stale {
            inner.entries.pop(key);
        }
        stale.len()
    }

    /// Drop all entries and reset statistics.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.hits = 0;
        inner.misses = 0;
        inner.evictions = 0;
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> u64 {
        self.inner.lock().hits
    }

    pub fn misses(&self) -> u64 {
        self.inner.lock().misses
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Consistent snapshot of all counters.
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            entry_count: inner.entries.len(),
            capacity: self.capacity.get(),
            evictions: inner.evictions,
        }
    }
}
