//! CORRAL Test Utilities
//!
//! Centralized test infrastructure for the CORRAL workspace:
//! - A scriptable mock backing store
//! - Proptest generators for keys, records, clients and configs
//! - Test fixtures for common scenarios

// Re-export core types for convenience
pub use corral_core::{
    BucketConfig, CacheConfig, ClientId, CorralConfig, CorralError, CorralResult, FetchError,
    QueueConfig, QueueError, RateLimitConfig, RateLimitError, User, UserId, ValidationError,
};
pub use corral_storage::{
    BoundedWorkQueue, FetchCoordinator, FetchOutcome, Fetched, InMemoryUserStore,
    RecordFetcher, Source, TtlLruCache,
};

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

// ============================================================================
// MOCK FETCHER
// ============================================================================

/// Backing store double that counts calls, can be held closed, and can be
/// told to fail.
///
/// A gated fetcher parks every call until [`release`](Self::release) hands
/// out permits, which lets a test pile callers onto one in-flight fetch
/// before letting it finish.
pub struct ScriptedFetcher<K, V> {
    records: Mutex<HashMap<K, V>>,
    calls: AtomicU64,
    failure: Mutex<Option<FetchError>>,
    gate: Option<Semaphore>,
}

impl<K, V> ScriptedFetcher<K, V>
where
    K: Hash + Eq + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    /// Fetcher that answers immediately from `records`.
    pub fn new(records: impl IntoIterator<Item = (K, V)>) -> Self {
        Self {
            records: Mutex::new(records.into_iter().collect()),
            calls: AtomicU64::new(0),
            failure: Mutex::new(None),
            gate: None,
        }
    }

    /// Fetcher whose calls block until released.
    pub fn gated(records: impl IntoIterator<Item = (K, V)>) -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::new(records)
        }
    }

    /// Let `n` parked (or future) calls through.
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    /// Make every following call fail with `error`, or succeed again on `None`.
    pub fn fail_with(&self, error: Option<FetchError>) {
        *self.failure.lock() = error;
    }

    pub fn insert(&self, key: K, value: V) {
        self.records.lock().insert(key, value);
    }

    /// Number of calls that reached the fetcher, parked ones included.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<K, V> RecordFetcher<K, V> for ScriptedFetcher<K, V>
where
    K: Hash + Eq + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    async fn fetch(&self, key: &K) -> Result<Option<V>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let permit = gate.acquire().await.map_err(|_| FetchError::Abandoned)?;
            permit.forget();
        }
        if let Some(error) = self.failure.lock().clone() {
            return Err(error);
        }
        Ok(self.records.lock().get(key).cloned())
    }
}

/// Loader closure for [`FetchCoordinator::fetch`] that reads `key` from
/// `fetcher`.
pub fn loader<F, K, V>(fetcher: Arc<F>, key: K) -> impl FnOnce() -> BoxFuture<'static, FetchOutcome<V>>
where
    F: RecordFetcher<K, V> + 'static,
    K: Send + Sync + 'static,
    V: 'static,
{
    move || Box::pin(async move { fetcher.fetch(&key).await })
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for CORRAL inputs.

    use super::*;
    use proptest::prelude::*;
    use std::time::Duration;

    /// Generate a user id in a small range so keys collide often.
    pub fn arb_user_id() -> impl Strategy<Value = UserId> {
        1u64..=64
    }

    /// Generate a raw path segment that is not a valid user id.
    pub fn arb_invalid_raw_id() -> impl Strategy<Value = String> {
        prop_oneof![
            "[a-zA-Z]{1,8}",
            "[0-9]{1,4}[a-zA-Z]{1,4}",
            "-[1-9][0-9]{0,4}",
            "[0-9]{1,3}\\.[0-9]{1,3}",
        ]
    }

    pub fn arb_user() -> impl Strategy<Value = User> {
        (arb_user_id(), "[A-Z][a-z]{2,10}", "[a-z]{3,10}").prop_map(|(id, name, local)| {
            let email = format!("{}@example.com", local);
            User::new(id, name, email)
        })
    }

    /// Generate an IPv4 client address as a string.
    pub fn arb_client_ip() -> impl Strategy<Value = String> {
        any::<[u8; 4]>().prop_map(|[a, b, c, d]| format!("{}.{}.{}.{}", a, b, c, d))
    }

    /// Generate a lookup key access pattern.
    pub fn arb_access_pattern(max_len: usize) -> impl Strategy<Value = Vec<UserId>> {
        prop::collection::vec(arb_user_id(), 1..max_len)
    }

    /// Generate a valid cache configuration.
    pub fn arb_cache_config() -> impl Strategy<Value = CacheConfig> {
        (1usize..32, 1u64..60_000).prop_map(|(capacity, ttl_ms)| {
            CacheConfig::default()
                .with_capacity(capacity)
                .with_ttl(Duration::from_millis(ttl_ms))
        })
    }

    /// Generate a valid token bucket configuration.
    pub fn arb_bucket_config() -> impl Strategy<Value = BucketConfig> {
        (1u32..20, 100u64..120_000).prop_map(|(capacity, refill_ms)| {
            BucketConfig::new(f64::from(capacity), Duration::from_millis(refill_ms))
        })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built objects for common test scenarios.

    use super::*;
    use std::time::Duration;

    /// The three demo users the seeded store starts with.
    pub fn demo_users() -> Vec<User> {
        vec![
            User::new(1, "Alice", "alice@gmail.com"),
            User::new(2, "Bob", "bob123@gmail.com"),
            User::new(3, "Charlie", "charlieharlie@gmail.com"),
        ]
    }

    /// Demo users keyed by id, ready for [`ScriptedFetcher::new`].
    pub fn demo_records() -> Vec<(UserId, User)> {
        demo_users().into_iter().map(|user| (user.id, user)).collect()
    }

    /// Seeded user table with no simulated latency.
    pub fn seeded_store() -> Arc<InMemoryUserStore> {
        Arc::new(InMemoryUserStore::seeded(Duration::ZERO))
    }

    /// Default component configuration with rate limiting switched off.
    pub fn unlimited_config() -> CorralConfig {
        CorralConfig {
            rate_limit: RateLimitConfig::default().with_enabled(false),
            ..Default::default()
        }
    }

    /// Coordinator over a fresh cache and queue. Must run inside a tokio
    /// runtime.
    pub fn coordinator(
        cache: &CacheConfig,
        queue: &QueueConfig,
    ) -> CorralResult<FetchCoordinator<UserId, User>> {
        Ok(FetchCoordinator::new(
            Arc::new(TtlLruCache::new(cache)?),
            Arc::new(BoundedWorkQueue::new(queue)?),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_scripted_fetcher_counts_and_fails() {
        let fetcher = ScriptedFetcher::new(fixtures::demo_records());
        assert_eq!(fetcher.fetch(&1).await.unwrap().unwrap().name, "Alice");
        assert!(fetcher.fetch(&9).await.unwrap().is_none());

        fetcher.fail_with(Some(FetchError::backend("down")));
        assert_eq!(fetcher.fetch(&1).await, Err(FetchError::backend("down")));
        assert_eq!(fetcher.calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gated_fetcher_waits_for_release() {
        let fetcher = Arc::new(ScriptedFetcher::gated(fixtures::demo_records()));
        let pending = tokio::spawn({
            let fetcher = Arc::clone(&fetcher);
            async move { fetcher.fetch(&2).await }
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!pending.is_finished());
        assert_eq!(fetcher.calls(), 1);

        fetcher.release(1);
        assert_eq!(pending.await.unwrap().unwrap().unwrap().name, "Bob");
    }
}
