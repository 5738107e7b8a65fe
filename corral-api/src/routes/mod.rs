//! REST API Routes Module
//!
//! Includes:
//! - User lookup (`GET /users/:id`) and creation (`POST /users`)
//! - Cache administration (`DELETE /cache`, `GET /cache-status`)
//! - Health check (`GET /health`, never rate limited)
//! - CORS support for browser-based clients

pub mod cache;
pub mod health;
pub mod users;

use std::time::Duration;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::ApiConfig;
use crate::constants::RETRY_AFTER_HEADER;
use crate::middleware::rate_limit_middleware;
use crate::state::AppState;

/// Build CORS layer from configuration.
fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([HeaderName::from_static(RETRY_AFTER_HEADER)])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.cors_origins.is_empty() {
        tracing::info!("CORS: allowing all origins");
        cors.allow_origin(Any)
    } else {
        tracing::info!(origins = ?config.cors_origins, "CORS: allowing configured origins");
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors.allow_origin(origins)
    }
}

/// Create the complete router.
///
/// `GET /users/:id` charges the rate limiter inside the lookup itself; the
/// other administrative routes go through [`rate_limit_middleware`], and
/// `/health` is never limited.
pub fn create_router(state: AppState) -> Router {
    let limited = Router::new()
        .route("/users", post(users::create_user))
        .route("/cache", delete(cache::clear_cache))
        .route("/cache-status", get(cache::cache_status))
        .route_layer(from_fn_with_state(state.clone(), rate_limit_middleware));

    let cors = build_cors_layer(&state.config);

    Router::new()
        .route("/users/:id", get(users::get_user))
        .merge(limited)
        .route("/health", get(health::health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
