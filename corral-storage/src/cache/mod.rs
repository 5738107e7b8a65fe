//! Bounded in-memory cache with TTL expiry and LRU eviction.
//!
//! Entries become invisible the moment their TTL elapses: a stale hit is
//! removed and counted as a miss. A periodic [`TtlLruCache::sweep_stale`]
//! reclaims stale entries that are never read again.
//!
//! # Write policy
//!
//! [`TtlLruCache::set`] never overwrites. The first value written for a key
//! stays until the key is removed, swept, or read after expiry. Callers that
//! need to replace a value must [`TtlLruCache::remove`] it first.

pub mod lru_ttl;
pub mod stats;

pub use lru_ttl::TtlLruCache;
pub use stats::CacheStats;
