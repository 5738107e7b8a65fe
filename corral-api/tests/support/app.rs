#![allow(dead_code)]

use std::time::Duration;

use axum::{
    body::Body,
    http::{HeaderMap, Request, StatusCode},
    Router,
};
use corral_api::{build_state, create_router, ApiConfig, AppState};
use serde_json::Value;
use tower::ServiceExt;

/// Default configuration with an instant backing store.
pub fn test_config() -> ApiConfig {
    ApiConfig {
        store_latency: Duration::ZERO,
        ..Default::default()
    }
}

/// Build the full router. Must run inside a tokio runtime.
pub fn test_app(config: ApiConfig) -> Result<(AppState, Router), String> {
    let state = build_state(config).map_err(|e| format!("Failed to build state: {}", e))?;
    let app = create_router(state.clone());
    Ok((state, app))
}

pub fn request(method: &str, uri: &str, client: Option<&str>, body: Option<Value>) -> Result<Request<Body>, String> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(client) = client {
        builder = builder.header("x-forwarded-for", client);
    }
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    builder
        .body(body)
        .map_err(|e| format!("Failed to build request: {}", e))
}

/// Send one request and decode the JSON body (`Value::Null` when empty).
pub async fn send(app: &Router, request: Request<Body>) -> Result<(StatusCode, HeaderMap, Value), String> {
    let response = app
        .clone()
        .oneshot(request)
        .await
        .map_err(|e| format!("Request failed: {:?}", e))?;
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .map_err(|e| format!("Failed to read body: {:?}", e))?;
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).map_err(|e| format!("Failed to parse body: {}", e))?
    };
    Ok((status, headers, json))
}

pub async fn get(app: &Router, uri: &str, client: &str) -> Result<(StatusCode, HeaderMap, Value), String> {
    send(app, request("GET", uri, Some(client), None)?).await
}
