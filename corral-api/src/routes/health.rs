//! Health Check Endpoint
//!
//! Liveness only; not rate limited.

use axum::{response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

/// Health check response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
}

/// GET /health - Process liveness check
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { ok: true })
}
