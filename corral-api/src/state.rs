//! Shared application state for Axum routers.

use std::sync::Arc;

use crate::config::ApiConfig;
use crate::service::LookupService;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    /// Cache, coordinator, queue and rate limiter behind one handle.
    pub service: Arc<LookupService>,
    pub config: Arc<ApiConfig>,
}

impl AppState {
    pub fn new(service: Arc<LookupService>, config: ApiConfig) -> Self {
        Self {
            service,
            config: Arc::new(config),
        }
    }
}
