//! CORRAL Storage - Caching and Fetch Coordination
//!
//! The pieces that sit between a request handler and a slow backing store:
//!
//! - [`TtlLruCache`]: bounded LRU cache with per-entry TTL
//! - [`BoundedWorkQueue`]: caps how many backing fetches run at once
//! - [`FetchCoordinator`]: single-flight fetches through the cache and queue
//! - [`RecordFetcher`]: the backing-store seam, with an in-memory user table

pub mod cache;
pub mod coalesce;
pub mod fetcher;
pub mod queue;

pub use cache::{CacheStats, TtlLruCache};
pub use coalesce::{FetchCoordinator, FetchOutcome, Fetched, Source};
pub use fetcher::{InMemoryUserStore, RecordFetcher};
pub use queue::BoundedWorkQueue;
