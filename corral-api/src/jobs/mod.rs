//! Background Jobs for CORRAL API
//!
//! - `sweep`: drops stale cache entries and idle rate limiter clients
//!
//! # Usage
//!
//! ```ignore
//! use corral_api::jobs::{sweep_task, SweepConfig};
//! use tokio::sync::watch;
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! tokio::spawn(sweep_task(Arc::clone(&service), SweepConfig::from_env(), shutdown_rx));
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! ```

pub mod sweep;

pub use sweep::{sweep_task, SweepConfig, SweepMetrics, SweepSnapshot};
