//! Periodic Sweep Background Task
//!
//! Expired cache entries are already treated as absent on read, but they
//! still occupy capacity until something removes them. This task removes
//! them on a fixed interval, and drops rate limiter state for clients that
//! have gone quiet.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use corral_core::env_or;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::constants::DEFAULT_SWEEP_INTERVAL_SECS;
use crate::service::LookupService;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the sweep task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepConfig {
    /// How often to sweep (default: 10 seconds)
    pub interval: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
        }
    }
}

impl SweepConfig {
    /// Environment variables:
    /// - `CORRAL_SWEEP_INTERVAL_SECS`: Sweep interval (default: 10)
    pub fn from_env() -> Self {
        let secs = env_or("CORRAL_SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL_SECS);
        Self {
            interval: Duration::from_secs(secs.max(1)),
        }
    }
}

// ============================================================================
// METRICS
// ============================================================================

/// Counters accumulated over the task's lifetime.
#[derive(Debug, Default)]
pub struct SweepMetrics {
    pub sweep_cycles: AtomicU64,
    pub stale_entries_removed: AtomicU64,
    pub idle_clients_removed: AtomicU64,
}

impl SweepMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> SweepSnapshot {
        SweepSnapshot {
            sweep_cycles: self.sweep_cycles.load(Ordering::Relaxed),
            stale_entries_removed: self.stale_entries_removed.load(Ordering::Relaxed),
            idle_clients_removed: self.idle_clients_removed.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of sweep metrics at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepSnapshot {
    pub sweep_cycles: u64,
    pub stale_entries_removed: u64,
    pub idle_clients_removed: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Sweep `service` every `config.interval` until `shutdown_rx` turns true.
///
/// Returns the metrics collected during the task's lifetime.
pub async fn sweep_task(
    service: Arc<LookupService>,
    config: SweepConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<SweepMetrics> {
    let metrics = Arc::new(SweepMetrics::new());

    let mut sweep_interval = interval(config.interval);
    sweep_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        interval_secs = config.interval.as_secs(),
        "Sweep task started"
    );

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                // A dropped sender also means shutdown.
                if changed.is_err() || *shutdown_rx.borrow() {
                    tracing::info!("Sweep task shutting down");
                    break;
                }
            }

            _ = sweep_interval.tick() => {
                sweep_once(&service, &metrics);
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        sweep_cycles = snapshot.sweep_cycles,
        stale_entries_removed = snapshot.stale_entries_removed,
        idle_clients_removed = snapshot.idle_clients_removed,
        "Sweep task completed"
    );

    metrics
}

fn sweep_once(service: &LookupService, metrics: &SweepMetrics) {
    let report = service.sweep();
    metrics.sweep_cycles.fetch_add(1, Ordering::Relaxed);
    metrics
        .stale_entries_removed
        .fetch_add(report.stale_entries as u64, Ordering::Relaxed);
    metrics
        .idle_clients_removed
        .fetch_add(report.idle_clients as u64, Ordering::Relaxed);

    if report.stale_entries > 0 || report.idle_clients > 0 {
        tracing::debug!(
            stale_entries = report.stale_entries,
            idle_clients = report.idle_clients,
            "Sweep cycle completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_core::{CacheConfig, CorralConfig};
    use corral_storage::InMemoryUserStore;

    #[test]
    fn test_config_default() {
        assert_eq!(
            SweepConfig::default().interval,
            Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_sweeps_until_shutdown() {
        let config = CorralConfig {
            cache: CacheConfig::default().with_ttl(Duration::from_secs(5)),
            ..Default::default()
        };
        let service = Arc::new(
            LookupService::new(&config, Arc::new(InMemoryUserStore::seeded(Duration::ZERO)))
                .unwrap(),
        );
        service.resolve("1").await.unwrap();
        service.resolve("2").await.unwrap();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(sweep_task(
            Arc::clone(&service),
            SweepConfig {
                interval: Duration::from_secs(10),
            },
            shutdown_rx,
        ));

        // Ticks at 0s (nothing stale) and 10s (both entries stale).
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(service.stats().size, 0);

        shutdown_tx.send(true).unwrap();
        let snapshot = handle.await.unwrap().snapshot();
        assert_eq!(snapshot.stale_entries_removed, 2);
        assert!(snapshot.sweep_cycles >= 2);
    }

    #[tokio::test]
    async fn test_dropped_sender_stops_task() {
        let service = Arc::new(
            LookupService::new(
                &CorralConfig::default(),
                Arc::new(InMemoryUserStore::seeded(Duration::ZERO)),
            )
            .unwrap(),
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(sweep_task(service, SweepConfig::default(), shutdown_rx));
        drop(shutdown_tx);
        let metrics = handle.await.unwrap();
        assert!(metrics.snapshot().sweep_cycles <= 1);
    }
}
