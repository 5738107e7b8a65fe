//! Cache administration endpoints.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::service::ServiceStats;
use crate::state::AppState;

/// Plain acknowledgement body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// DELETE /cache - Drop every cached entry and reset hit/miss counters
pub async fn clear_cache(State(state): State<AppState>) -> Json<MessageResponse> {
    state.service.clear_cache();
    Json(MessageResponse {
        message: "Cache cleared".to_string(),
    })
}

/// GET /cache-status - Cache, queue and limiter counters
pub async fn cache_status(State(state): State<AppState>) -> Json<ServiceStats> {
    Json(state.service.stats())
}
