//! Configuration types
//!
//! Every section can be built from defaults, adjusted with `with_*`
//! builders, or loaded from `CORRAL_*` environment variables.

use crate::error::{ConfigError, CorralError, CorralResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Default cache capacity (entries).
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

/// Default cache entry TTL in milliseconds.
pub const DEFAULT_CACHE_TTL_MS: u64 = 40_000;

/// Default number of backing fetches allowed to run at once.
pub const DEFAULT_QUEUE_CONCURRENCY: usize = 5;

/// Default sustained bucket: 10 tokens per minute.
pub const DEFAULT_SUSTAINED_CAPACITY: f64 = 10.0;
pub const DEFAULT_SUSTAINED_REFILL_MS: u64 = 60_000;

/// Default burst bucket: 5 tokens per 10 seconds.
pub const DEFAULT_BURST_CAPACITY: f64 = 5.0;
pub const DEFAULT_BURST_REFILL_MS: u64 = 10_000;

/// Default idle time before a client's buckets are forgotten.
pub const DEFAULT_CLIENT_IDLE_SECS: u64 = 600;

/// Default simulated latency of the mock backing store.
pub const DEFAULT_STORE_LATENCY_MS: u64 = 200;

/// Read and parse an environment variable, falling back to `default` when
/// the variable is unset or unparseable.
pub fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(default)
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> CorralError {
    CorralError::Config(ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    })
}

// ============================================================================
// CACHE
// ============================================================================

/// Configuration for the LRU cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of live entries.
    pub capacity: usize,
    /// Time-to-live applied to every entry at insertion.
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CACHE_CAPACITY,
            ttl: Duration::from_millis(DEFAULT_CACHE_TTL_MS),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Environment variables:
    /// - `CORRAL_CACHE_CAPACITY` (default: 1000)
    /// - `CORRAL_CACHE_TTL_MS` (default: 40000)
    pub fn from_env() -> Self {
        Self {
            capacity: env_or("CORRAL_CACHE_CAPACITY", DEFAULT_CACHE_CAPACITY),
            ttl: Duration::from_millis(env_or("CORRAL_CACHE_TTL_MS", DEFAULT_CACHE_TTL_MS)),
        }
    }

    /// A zero capacity is rejected rather than treated as a disabled cache.
    /// A zero TTL is allowed and makes every entry immediately stale.
    pub fn validate(&self) -> CorralResult<()> {
        if self.capacity == 0 {
            return Err(invalid(
                "cache.capacity",
                self.capacity,
                "capacity must be greater than 0",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// WORK QUEUE
// ============================================================================

/// Configuration for the bounded work queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum number of tasks executing at once.
    pub concurrency: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_QUEUE_CONCURRENCY,
        }
    }
}

impl QueueConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Environment variables:
    /// - `CORRAL_QUEUE_CONCURRENCY` (default: 5)
    pub fn from_env() -> Self {
        Self {
            concurrency: env_or("CORRAL_QUEUE_CONCURRENCY", DEFAULT_QUEUE_CONCURRENCY),
        }
    }

    pub fn validate(&self) -> CorralResult<()> {
        if self.concurrency == 0 {
            return Err(invalid(
                "queue.concurrency",
                self.concurrency,
                "concurrency must be greater than 0",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// RATE LIMITING
// ============================================================================

/// Shape of a single token bucket: `capacity` tokens refilled continuously
/// over `refill_interval`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketConfig {
    pub capacity: f64,
    pub refill_interval: Duration,
}

impl BucketConfig {
    pub fn new(capacity: f64, refill_interval: Duration) -> Self {
        Self {
            capacity,
            refill_interval,
        }
    }

    /// Refill rate in tokens per millisecond.
    pub fn refill_rate_per_ms(&self) -> f64 {
        let interval_ms = self.refill_interval.as_secs_f64() * 1000.0;
        if interval_ms <= 0.0 {
            0.0
        } else {
            self.capacity / interval_ms
        }
    }

    fn validate(&self, field: &str) -> CorralResult<()> {
        if !self.capacity.is_finite() || self.capacity < 1.0 {
            return Err(invalid(
                &format!("{}.capacity", field),
                self.capacity,
                "capacity must be a finite number of at least 1 token",
            ));
        }
        if self.refill_interval.is_zero() {
            return Err(invalid(
                &format!("{}.refill_interval", field),
                format!("{:?}", self.refill_interval),
                "refill interval must be greater than 0",
            ));
        }
        Ok(())
    }
}

/// Configuration for the dual token bucket rate limiter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Whether rate limiting is enforced at all.
    pub enabled: bool,
    /// Long-window bucket.
    pub sustained: BucketConfig,
    /// Short-window bucket.
    pub burst: BucketConfig,
    /// Clients untouched for this long are dropped by the idle sweep.
    pub client_idle_timeout: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sustained: BucketConfig::new(
                DEFAULT_SUSTAINED_CAPACITY,
                Duration::from_millis(DEFAULT_SUSTAINED_REFILL_MS),
            ),
            burst: BucketConfig::new(
                DEFAULT_BURST_CAPACITY,
                Duration::from_millis(DEFAULT_BURST_REFILL_MS),
            ),
            client_idle_timeout: Duration::from_secs(DEFAULT_CLIENT_IDLE_SECS),
        }
    }
}

impl RateLimitConfig {
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_sustained(mut self, bucket: BucketConfig) -> Self {
        self.sustained = bucket;
        self
    }

    pub fn with_burst(mut self, bucket: BucketConfig) -> Self {
        self.burst = bucket;
        self
    }

    pub fn with_client_idle_timeout(mut self, timeout: Duration) -> Self {
        self.client_idle_timeout = timeout;
        self
    }

    /// Environment variables:
    /// - `CORRAL_RATE_LIMIT_ENABLED`: "true" or "false" (default: true)
    /// - `CORRAL_RATE_SUSTAINED_CAPACITY` / `CORRAL_RATE_SUSTAINED_REFILL_MS` (default: 10 / 60000)
    /// - `CORRAL_RATE_BURST_CAPACITY` / `CORRAL_RATE_BURST_REFILL_MS` (default: 5 / 10000)
    /// - `CORRAL_CLIENT_IDLE_SECS` (default: 600)
    pub fn from_env() -> Self {
        let enabled = std::env::var("CORRAL_RATE_LIMIT_ENABLED")
            .ok()
            .map(|s| s.to_lowercase() != "false")
            .unwrap_or(true);

        Self {
            enabled,
            sustained: BucketConfig::new(
                env_or("CORRAL_RATE_SUSTAINED_CAPACITY", DEFAULT_SUSTAINED_CAPACITY),
                Duration::from_millis(env_or(
                    "CORRAL_RATE_SUSTAINED_REFILL_MS",
                    DEFAULT_SUSTAINED_REFILL_MS,
                )),
            ),
            burst: BucketConfig::new(
                env_or("CORRAL_RATE_BURST_CAPACITY", DEFAULT_BURST_CAPACITY),
                Duration::from_millis(env_or("CORRAL_RATE_BURST_REFILL_MS", DEFAULT_BURST_REFILL_MS)),
            ),
            client_idle_timeout: Duration::from_secs(env_or(
                "CORRAL_CLIENT_IDLE_SECS",
                DEFAULT_CLIENT_IDLE_SECS,
            )),
        }
    }

    pub fn validate(&self) -> CorralResult<()> {
        self.sustained.validate("rate_limit.sustained")?;
        self.burst.validate("rate_limit.burst")?;
        Ok(())
    }
}

// ============================================================================
// AGGREGATE
// ============================================================================

/// Top-level configuration for a lookup service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CorralConfig {
    pub cache: CacheConfig,
    pub queue: QueueConfig,
    pub rate_limit: RateLimitConfig,
}

impl CorralConfig {
    pub fn from_env() -> Self {
        Self {
            cache: CacheConfig::from_env(),
            queue: QueueConfig::from_env(),
            rate_limit: RateLimitConfig::from_env(),
        }
    }

    pub fn validate(&self) -> CorralResult<()> {
        self.cache.validate()?;
        self.queue.validate()?;
        self.rate_limit.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = CorralConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cache.capacity, 1000);
        assert_eq!(config.cache.ttl, Duration::from_millis(40_000));
        assert_eq!(config.queue.concurrency, 5);
        assert!(config.rate_limit.enabled);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let config = CacheConfig::new().with_capacity(0);
        let err = config.validate().unwrap_err();
        assert!(matches!(err, CorralError::Config(ConfigError::InvalidValue { .. })));
        assert!(err.to_string().contains("cache.capacity"));
    }

    #[test]
    fn test_zero_ttl_allowed() {
        let config = CacheConfig::new().with_ttl(Duration::ZERO);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let config = QueueConfig::default().with_concurrency(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_refill_rates_match_defaults() {
        let config = RateLimitConfig::default();
        assert!((config.sustained.refill_rate_per_ms() - 10.0 / 60_000.0).abs() < 1e-12);
        assert!((config.burst.refill_rate_per_ms() - 5.0 / 10_000.0).abs() < 1e-12);
    }

    #[test]
    fn test_bucket_validation() {
        let config = RateLimitConfig::default()
            .with_burst(BucketConfig::new(0.5, Duration::from_secs(1)));
        assert!(config.validate().is_err());

        let config = RateLimitConfig::default()
            .with_sustained(BucketConfig::new(10.0, Duration::ZERO));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        std::env::set_var("CORRAL_TEST_ENV_OR_GARBAGE", "not-a-number");
        assert_eq!(env_or("CORRAL_TEST_ENV_OR_GARBAGE", 7usize), 7);
        std::env::set_var("CORRAL_TEST_ENV_OR_GARBAGE", " 12 ");
        assert_eq!(env_or("CORRAL_TEST_ENV_OR_GARBAGE", 7usize), 12);
        std::env::remove_var("CORRAL_TEST_ENV_OR_GARBAGE");
    }
}
