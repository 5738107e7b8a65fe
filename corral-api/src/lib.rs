//! CORRAL API - HTTP Surface for the Lookup Layer
//!
//! Exposes the cached, coalesced, rate-limited user lookup over Axum, plus
//! the administrative cache endpoints and the background sweep job.

pub mod config;
pub mod constants;
pub mod error;
pub mod jobs;
pub mod middleware;
pub mod rate_limit;
pub mod routes;
pub mod service;
pub mod state;
pub mod telemetry;
pub mod validation;

use std::sync::Arc;

use corral_storage::InMemoryUserStore;

// Re-export commonly used types
pub use config::ApiConfig;
pub use error::{ApiError, ApiResult, ErrorCode};
pub use rate_limit::{RateDecision, RateLimiter, TokenBucket};
pub use routes::create_router;
pub use service::{Lookup, LookupError, LookupService, ServiceStats, SweepReport};
pub use state::AppState;

/// Build the shared state for `config`: a seeded user table behind a fresh
/// lookup service. Must run inside a tokio runtime.
pub fn build_state(config: ApiConfig) -> ApiResult<AppState> {
    config.validate()?;
    let store = Arc::new(InMemoryUserStore::seeded(config.store_latency));
    let service = LookupService::new(&config.core, store)?
        .with_lookup_timeout(config.lookup_timeout);
    Ok(AppState::new(Arc::new(service), config))
}
