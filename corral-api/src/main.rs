//! CORRAL API Server Entry Point
//!
//! Bootstraps configuration, starts the sweep job and serves HTTP until
//! Ctrl-C.

use std::net::SocketAddr;
use std::sync::Arc;

use corral_api::jobs::{sweep_task, SweepConfig};
use corral_api::telemetry::init_tracing;
use corral_api::{build_state, create_router, ApiConfig, ApiError, ApiResult};
use tokio::sync::watch;

#[tokio::main]
async fn main() -> ApiResult<()> {
    init_tracing()?;

    let api_config = ApiConfig::from_env();
    let addr = api_config.bind_addr()?;
    let state = build_state(api_config)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = tokio::spawn(sweep_task(
        Arc::clone(&state.service),
        SweepConfig::from_env(),
        shutdown_rx,
    ));

    let app = create_router(state);

    tracing::info!(%addr, "Starting CORRAL API server");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>());

    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    let _ = shutdown_tx.send(true);
    if let Err(e) = sweeper.await {
        tracing::warn!(error = %e, "Sweep task did not shut down cleanly");
    }

    Ok(())
}
