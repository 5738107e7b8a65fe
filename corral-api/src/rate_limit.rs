//! Dual token bucket rate limiter.
//!
//! Every client owns two buckets: a small `burst` bucket that refills over a
//! short window and a larger `sustained` bucket that refills over a long one.
//! A request is admitted only when both buckets hold at least one token, and
//! then costs one token from each. Buckets are created lazily and full.

use std::time::Duration;

use corral_core::{BucketConfig, ClientId, CorralResult, RateLimitConfig, RateLimitError};
use dashmap::DashMap;
use tokio::time::Instant;

// ============================================================================
// TOKEN BUCKET
// ============================================================================

/// A continuously refilling bucket of fractional tokens.
#[derive(Debug, Clone)]
pub struct TokenBucket {
    tokens: f64,
    capacity: f64,
    /// Tokens added per millisecond.
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// A bucket holding its full capacity at `now`.
    pub fn full(config: &BucketConfig, now: Instant) -> Self {
        Self {
            tokens: config.capacity,
            capacity: config.capacity,
            refill_rate: config.refill_rate_per_ms(),
            last_refill: now,
        }
    }

    /// Credit the tokens accrued since the last refill, capped at capacity.
    pub fn refill(&mut self, now: Instant) {
        self.tokens = self.projected(now);
        self.last_refill = now;
    }

    pub fn tokens(&self) -> f64 {
        self.tokens
    }

    pub fn has_token(&self) -> bool {
        self.tokens >= 1.0
    }

    fn consume(&mut self) {
        self.tokens -= 1.0;
    }

    /// Tokens the bucket would hold at `now` without mutating it.
    fn projected(&self, now: Instant) -> f64 {
        let elapsed_ms = now.saturating_duration_since(self.last_refill).as_secs_f64() * 1000.0;
        (self.tokens + elapsed_ms * self.refill_rate).min(self.capacity)
    }

    /// Time until one whole token is available, measured from the last refill.
    pub fn time_until_token(&self) -> Duration {
        if self.has_token() {
            return Duration::ZERO;
        }
        if self.refill_rate <= 0.0 {
            return Duration::MAX;
        }
        let missing_ms = (1.0 - self.tokens) / self.refill_rate;
        Duration::from_secs_f64(missing_ms / 1000.0)
    }

    fn is_full_at(&self, now: Instant) -> bool {
        self.projected(now) >= self.capacity
    }
}

// ============================================================================
// PER-CLIENT STATE
// ============================================================================

/// The two buckets a single client draws from.
#[derive(Debug, Clone)]
struct ClientBuckets {
    sustained: TokenBucket,
    burst: TokenBucket,
    last_seen: Instant,
}

impl ClientBuckets {
    fn full(config: &RateLimitConfig, now: Instant) -> Self {
        Self {
            sustained: TokenBucket::full(&config.sustained, now),
            burst: TokenBucket::full(&config.burst, now),
            last_seen: now,
        }
    }

    fn try_acquire(&mut self, now: Instant) -> RateDecision {
        self.sustained.refill(now);
        self.burst.refill(now);
        self.last_seen = now;

        if !self.sustained.has_token() || !self.burst.has_token() {
            let retry_after = self
                .sustained
                .time_until_token()
                .max(self.burst.time_until_token());
            return RateDecision::Deny { retry_after };
        }

        self.sustained.consume();
        self.burst.consume();
        RateDecision::Allow
    }

    /// Idle long enough, and both buckets would be full again, so forgetting
    /// the client is indistinguishable from keeping it.
    fn is_idle(&self, now: Instant, max_idle: Duration) -> bool {
        now.saturating_duration_since(self.last_seen) >= max_idle
            && self.sustained.is_full_at(now)
            && self.burst.is_full_at(now)
    }
}

// ============================================================================
// RATE LIMITER
// ============================================================================

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allow,
    /// Rejected; both buckets will hold a token after `retry_after`.
    Deny { retry_after: Duration },
}

impl RateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateDecision::Allow)
    }
}

/// Per-client dual token bucket limiter.
pub struct RateLimiter {
    config: RateLimitConfig,
    clients: DashMap<ClientId, ClientBuckets>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> CorralResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            clients: DashMap::new(),
        })
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Admit or deny one request from `client`.
    ///
    /// A blank identifier is an error even when limiting is disabled.
    pub fn check(&self, client: &str) -> Result<RateDecision, RateLimitError> {
        let client = ClientId::parse(client)?;
        if !self.config.enabled {
            return Ok(RateDecision::Allow);
        }

        let now = Instant::now();
        let mut buckets = self
            .clients
            .entry(client)
            .or_insert_with(|| ClientBuckets::full(&self.config, now));
        Ok(buckets.try_acquire(now))
    }

    /// Forget clients untouched for `max_idle` whose buckets have refilled.
    /// Returns how many were dropped.
    pub fn sweep_idle(&self, max_idle: Duration) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.clients.retain(|_, buckets| {
            let idle = buckets.is_idle(now, max_idle);
            if idle {
                removed += 1;
            }
            !idle
        });
        removed
    }

    /// Number of clients with live bucket state.
    pub fn tracked_clients(&self) -> usize {
        self.clients.len()
    }

    pub fn reset(&self) {
        self.clients.clear();
    }
}
