//! The lookup service.
//!
//! [`LookupService`] owns every piece of shared state: the cache, the work
//! queue, the in-flight registry (inside the coordinator), the rate limiter
//! and the backing store. Build one per process and share it behind an
//! `Arc`; tests build a fresh one or call [`LookupService::reset`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use corral_core::{
    parse_user_id, CorralConfig, CorralResult, FetchError, RateLimitError, User, UserId,
    ValidationError,
};
use corral_storage::{
    BoundedWorkQueue, FetchCoordinator, InMemoryUserStore, RecordFetcher, Source, TtlLruCache,
};
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::rate_limit::{RateDecision, RateLimiter};

// ============================================================================
// OUTCOMES
// ============================================================================

/// A resolved lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lookup {
    pub source: Source,
    pub user: User,
}

/// Every way a lookup can fail to produce a user.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LookupError {
    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error(transparent)]
    InvalidClient(#[from] RateLimitError),

    #[error(transparent)]
    InvalidKey(#[from] ValidationError),

    #[error("User {id} not found")]
    NotFound { id: UserId },

    #[error(transparent)]
    Internal(#[from] FetchError),
}

/// Snapshot served by the status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStats {
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub avg_response_time_ms: f64,
    pub capacity: usize,
    pub evictions: u64,
    pub in_flight: usize,
    pub queue_concurrency: usize,
    pub queue_executing: usize,
    pub queue_queued: usize,
    pub tracked_clients: usize,
}

/// What one maintenance sweep removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub stale_entries: usize,
    pub idle_clients: usize,
}

// ============================================================================
// SERVICE
// ============================================================================

/// Rate-limited, cached, coalesced user lookups.
pub struct LookupService {
    coordinator: FetchCoordinator<UserId, User>,
    limiter: RateLimiter,
    store: Arc<InMemoryUserStore>,
    client_idle_timeout: Duration,
    lookup_timeout: Option<Duration>,
    timed_lookups: AtomicU64,
    total_response_micros: AtomicU64,
}

impl LookupService {
    /// Build the service. Spawns the queue workers, so this must run inside a
    /// tokio runtime.
    pub fn new(config: &CorralConfig, store: Arc<InMemoryUserStore>) -> CorralResult<Self> {
        config.validate()?;
        let cache = Arc::new(TtlLruCache::new(&config.cache)?);
        let queue = Arc::new(BoundedWorkQueue::new(&config.queue)?);

        info!(
            cache_capacity = config.cache.capacity,
            cache_ttl_ms = config.cache.ttl.as_millis() as u64,
            queue_concurrency = config.queue.concurrency,
            rate_limit_enabled = config.rate_limit.enabled,
            "Lookup service initialized"
        );

        Ok(Self {
            coordinator: FetchCoordinator::new(cache, queue),
            limiter: RateLimiter::new(config.rate_limit.clone())?,
            store,
            client_idle_timeout: config.rate_limit.client_idle_timeout,
            lookup_timeout: None,
            timed_lookups: AtomicU64::new(0),
            total_response_micros: AtomicU64::new(0),
        })
    }

    /// Give up on lookups that have not settled after `timeout`.
    pub fn with_lookup_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    /// Charge one request to `client` against the rate limiter.
    pub fn check_rate(&self, client: &str) -> Result<RateDecision, RateLimitError> {
        self.limiter.check(client)
    }

    /// Rate-limit, then resolve `raw_key`.
    ///
    /// Only lookups that pass the limiter count towards the average response
    /// time.
    pub async fn lookup(&self, client: &str, raw_key: &str) -> Result<Lookup, LookupError> {
        if let RateDecision::Deny { retry_after } = self.limiter.check(client)? {
            debug!(client, retry_after_ms = retry_after.as_millis() as u64, "Lookup rate limited");
            return Err(LookupError::RateLimited { retry_after });
        }

        let started = Instant::now();
        let result = self.resolve(raw_key).await;
        self.record_response(started.elapsed());
        result
    }

    /// Resolve `raw_key` without charging the rate limiter.
    pub async fn resolve(&self, raw_key: &str) -> Result<Lookup, LookupError> {
        let id = parse_user_id(raw_key)?;
        let store = Arc::clone(&self.store);
        let loader = move || async move { store.fetch(&id).await };

        let fetched = match self.lookup_timeout {
            Some(timeout) => self.coordinator.fetch_with_deadline(id, loader, timeout).await,
            None => self.coordinator.fetch(id, loader).await,
        };

        match fetched {
            Ok(Some(fetched)) => Ok(Lookup {
                source: fetched.source,
                user: fetched.value,
            }),
            Ok(None) => Err(LookupError::NotFound { id }),
            Err(error) => {
                warn!(user_id = id, error = %error, "Lookup failed");
                Err(LookupError::Internal(error))
            }
        }
    }

    /// Store a new user and write it through to the cache.
    ///
    /// The cache keeps any value already present under the new id.
    pub fn create_user(&self, name: &str, email: &str) -> User {
        let user = self.store.create(name, email);
        let cached = self.coordinator.put(user.id, user.clone());
        info!(user_id = user.id, cached, "User created");
        user
    }

    pub fn clear_cache(&self) {
        self.coordinator.cache().clear();
        info!("Cache cleared");
    }

    pub fn stats(&self) -> ServiceStats {
        let cache = self.coordinator.cache().stats();
        let queue = self.coordinator.queue();
        ServiceStats {
            size: cache.entry_count,
            hits: cache.hits,
            misses: cache.misses,
            hit_rate: cache.hit_rate(),
            avg_response_time_ms: self.avg_response_time_ms(),
            capacity: cache.capacity,
            evictions: cache.evictions,
            in_flight: self.coordinator.in_flight(),
            queue_concurrency: queue.concurrency(),
            queue_executing: queue.executing(),
            queue_queued: queue.queued(),
            tracked_clients: self.limiter.tracked_clients(),
        }
    }

    /// Drop stale cache entries and idle rate limiter clients.
    pub fn sweep(&self) -> SweepReport {
        SweepReport {
            stale_entries: self.coordinator.cache().sweep_stale(),
            idle_clients: self.limiter.sweep_idle(self.client_idle_timeout),
        }
    }

    /// Forget all cached values, in-flight fetches, client buckets and
    /// timings.
    pub fn reset(&self) {
        self.coordinator.reset();
        self.limiter.reset();
        self.timed_lookups.store(0, Ordering::SeqCst);
        self.total_response_micros.store(0, Ordering::SeqCst);
    }

    pub fn store(&self) -> &Arc<InMemoryUserStore> {
        &self.store
    }

    fn record_response(&self, elapsed: Duration) {
        self.total_response_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::SeqCst);
        self.timed_lookups.fetch_add(1, Ordering::SeqCst);
    }

    fn avg_response_time_ms(&self) -> f64 {
        let count = self.timed_lookups.load(Ordering::SeqCst);
        if count == 0 {
            return 0.0;
        }
        let total_ms = self.total_response_micros.load(Ordering::SeqCst) as f64 / 1000.0;
        total_ms / count as f64
    }
}
