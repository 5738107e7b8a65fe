//! Request coalescing in front of the cache.
//!
//! [`FetchCoordinator::fetch`] serves a key from the cache when it can.
//! Otherwise it joins the fetch already in flight for that key, or starts
//! one. A started fetch runs as its own task: the loader goes through the
//! [`BoundedWorkQueue`], a found value is written back to the cache, and the
//! outcome is broadcast to every caller waiting on the key.
//!
//! The broadcast is a `watch` channel that is written exactly once. The
//! registry entry is removed by a drop guard, so it disappears after the
//! fetch settles whether the loader succeeded, failed or panicked, and even
//! if every caller has gone away.

use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use corral_core::FetchError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::watch;

use crate::cache::TtlLruCache;
use crate::queue::BoundedWorkQueue;

/// Outcome shared by every caller of one fetch.
pub type FetchOutcome<V> = Result<Option<V>, FetchError>;

type OutcomeReceiver<V> = watch::Receiver<Option<FetchOutcome<V>>>;

/// Where a fetched value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    /// Served from the cache without touching the loader.
    Cache,
    /// Shared the result of a fetch another caller started.
    Coalesced,
    /// This caller started the fetch.
    Fresh,
}

/// A value together with its [`Source`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched<V> {
    pub source: Source,
    pub value: V,
}

/// How a cache miss is resolved.
enum Resolution<V> {
    /// A flight settled after the miss and its value is now cached.
    Cached(V),
    /// Wait on a flight, our own or one already running.
    Await(OutcomeReceiver<V>, Source),
}

/// One in-flight fetch.
struct Flight<V> {
    id: u64,
    outcome: OutcomeReceiver<V>,
}

/// Removes its flight from the registry when dropped.
struct FlightGuard<K: Hash + Eq, V> {
    registry: Arc<DashMap<K, Flight<V>>>,
    key: K,
    id: u64,
}

impl<K: Hash + Eq, V> Drop for FlightGuard<K, V> {
    fn drop(&mut self) {
        // A reset may have replaced our entry with a newer flight.
        let id = self.id;
        self.registry.remove_if(&self.key, |_, flight| flight.id == id);
    }
}

/// Single-flight coordinator over a cache and a work queue.
pub struct FetchCoordinator<K: Hash + Eq, V> {
    cache: Arc<TtlLruCache<K, V>>,
    queue: Arc<BoundedWorkQueue>,
    in_flight: Arc<DashMap<K, Flight<V>>>,
    next_flight_id: AtomicU64,
}

impl<K, V> FetchCoordinator<K, V>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(cache: Arc<TtlLruCache<K, V>>, queue: Arc<BoundedWorkQueue>) -> Self {
        Self {
            cache,
            queue,
            in_flight: Arc::new(DashMap::new()),
            next_flight_id: AtomicU64::new(0),
        }
    }

    /// Resolve `key`, invoking `loader` only if no cached value and no
    /// in-flight fetch exists for it.
    ///
    /// Returns `Ok(None)` when the loader reports the key as absent.
    pub async fn fetch<F, Fut>(&self, key: K, loader: F) -> Result<Option<Fetched<V>>, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchOutcome<V>> + Send + 'static,
    {
        if let Some(value) = self.cache.get(&key) {
            return Ok(Some(Fetched {
                source: Source::Cache,
                value,
            }));
        }

        match self.join_or_start(key, loader) {
            Resolution::Cached(value) => Ok(Some(Fetched {
                source: Source::Cache,
                value,
            })),
            Resolution::Await(mut outcome, source) => {
                let value = wait_for_outcome(&mut outcome).await?;
                Ok(value.map(|value| Fetched { source, value }))
            }
        }
    }

    /// Like [`fetch`](Self::fetch), but give up waiting after `timeout`.
    ///
    /// Only this caller is detached. The fetch keeps running for any other
    /// waiters and still clears its registry entry when it settles.
    pub async fn fetch_with_deadline<F, Fut>(
        &self,
        key: K,
        loader: F,
        timeout: Duration,
    ) -> Result<Option<Fetched<V>>, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchOutcome<V>> + Send + 'static,
    {
        tokio::time::timeout(timeout, self.fetch(key, loader))
            .await
            .unwrap_or(Err(FetchError::TimedOut { timeout }))
    }

    fn join_or_start<F, Fut>(&self, key: K, loader: F) -> Resolution<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchOutcome<V>> + Send + 'static,
    {
        let (sender, receiver, id) = match self.in_flight.entry(key.clone()) {
            Entry::Occupied(entry) => {
                tracing::trace!(key = ?key, "Joining in-flight fetch");
                return Resolution::Await(entry.get().outcome.clone(), Source::Coalesced);
            }
            Entry::Vacant(entry) => {
                // A flight caches its value before it leaves the registry, so
                // one that settled since our miss is visible here.
                if let Some(value) = self.cache.peek(&key) {
                    return Resolution::Cached(value);
                }
                let (sender, receiver) = watch::channel(None);
                let id = self.next_flight_id.fetch_add(1, Ordering::Relaxed);
                entry.insert(Flight {
                    id,
                    outcome: receiver.clone(),
                });
                (sender, receiver, id)
            }
        };

        tracing::debug!(key = ?key, flight_id = id, "Starting backing fetch");

        let guard = FlightGuard {
            registry: Arc::clone(&self.in_flight),
            key: key.clone(),
            id,
        };
        let load = loader();
        let cache = Arc::clone(&self.cache);
        let queue = Arc::clone(&self.queue);

        tokio::spawn(async move {
            let _guard = guard;
            let outcome = match queue.submit(load).await {
                Ok(outcome) => outcome,
                Err(err) => Err(FetchError::from(err)),
            };

            match &outcome {
                Ok(Some(value)) => {
                    cache.set(key.clone(), value.clone());
                }
                Ok(None) => tracing::debug!(key = ?key, "Backing fetch found nothing"),
                Err(err) => tracing::warn!(key = ?key, error = %err, "Backing fetch failed"),
            }

            sender.send_replace(Some(outcome));
        });

        Resolution::Await(receiver, Source::Fresh)
    }

    /// Write a value straight into the cache, bypassing the loader.
    ///
    /// Obeys the cache's no-overwrite policy.
    pub fn put(&self, key: K, value: V) -> bool {
        self.cache.set(key, value)
    }

    pub fn cache(&self) -> &Arc<TtlLruCache<K, V>> {
        &self.cache
    }

    pub fn queue(&self) -> &Arc<BoundedWorkQueue> {
        &self.queue
    }

    /// Number of keys with a fetch currently outstanding.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Clear the cache and forget all in-flight fetches.
    ///
    /// Running fetches still deliver to callers already waiting on them but
    /// new callers start fresh.
    pub fn reset(&self) {
        self.cache.clear();
        self.in_flight.clear();
    }
}

async fn wait_for_outcome<V: Clone>(receiver: &mut OutcomeReceiver<V>) -> FetchOutcome<V> {
    match receiver.wait_for(Option::is_some).await {
        Ok(settled) => (*settled).clone().unwrap_or(Err(FetchError::Abandoned)),
        Err(_) => Err(FetchError::Abandoned),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corral_core::{CacheConfig, QueueConfig};
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    fn coordinator(concurrency: usize) -> Arc<FetchCoordinator<u64, String>> {
        let cache = Arc::new(
            TtlLruCache::new(&CacheConfig::new().with_capacity(16)).expect("valid cache"),
        );
        let queue = Arc::new(
            BoundedWorkQueue::new(&QueueConfig::default().with_concurrency(concurrency))
                .expect("valid queue"),
        );
        Arc::new(FetchCoordinator::new(cache, queue))
    }

    #[tokio::test]
    async fn test_cache_hit_skips_loader() {
        let coordinator = coordinator(2);
        coordinator.put(1, "cached".to_string());

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let fetched = coordinator
            .fetch(1, move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(Some("loaded".to_string())) }
            })
            .await
            .unwrap();

        assert_eq!(
            fetched,
            Some(Fetched {
                source: Source::Cache,
                value: "cached".to_string()
            })
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_value_cached_after_miss_skips_new_flight() {
        let coordinator = coordinator(2);
        // The miss already happened; a flight then settled and cached "1".
        assert!(coordinator.cache().get(&1).is_none());
        coordinator.put(1, "settled".to_string());

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let resolution = coordinator.join_or_start(1, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(Some("reloaded".to_string())) }
        });

        match resolution {
            Resolution::Cached(value) => assert_eq!(value, "settled"),
            Resolution::Await(_, source) => panic!("started a {source:?} flight"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(coordinator.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_fresh_fetch_writes_back() {
        let coordinator = coordinator(2);

        let fetched = coordinator
            .fetch(3, || async { Ok(Some("charlie".to_string())) })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(fetched.source, Source::Fresh);
        assert_eq!(fetched.value, "charlie");

        let again = coordinator
            .fetch(3, || async { Ok(Some("other".to_string())) })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(again.source, Source::Cache);
        assert_eq!(again.value, "charlie");
        assert_eq!(coordinator.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_not_found_is_not_cached() {
        let coordinator = coordinator(2);

        let fetched = coordinator.fetch(9, || async { Ok(None) }).await.unwrap();
        assert!(fetched.is_none());
        assert!(coordinator.cache().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_share_one_loader_call() {
        let coordinator = coordinator(2);
        let calls = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(Notify::new());

        let mut handles = Vec::new();
        for _ in 0..20 {
            let coordinator = Arc::clone(&coordinator);
            let calls = Arc::clone(&calls);
            let release = Arc::clone(&release);
            handles.push(tokio::spawn(async move {
                coordinator
                    .fetch(7, move || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        async move {
                            release.notified().await;
                            Ok(Some("shared".to_string()))
                        }
                    })
                    .await
            }));
        }

        while coordinator.in_flight() == 0 {
            tokio::task::yield_now().await;
        }
        // Give every caller a chance to attach before the fetch settles.
        tokio::time::sleep(Duration::from_millis(50)).await;
        release.notify_one();

        let mut sources = Vec::new();
        for handle in handles {
            let fetched = handle.await.expect("join").expect("fetch ok").expect("found");
            assert_eq!(fetched.value, "shared");
            sources.push(fetched.source);
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(sources.iter().filter(|s| **s == Source::Fresh).count(), 1);
        assert_eq!(coordinator.in_flight(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_failure_reaches_every_waiter_then_retries() {
        let coordinator = coordinator(2);
        let release = Arc::new(Notify::new());

        let mut handles = Vec::new();
        for _ in 0..5 {
            let coordinator = Arc::clone(&coordinator);
            let release = Arc::clone(&release);
            handles.push(tokio::spawn(async move {
                coordinator
                    .fetch(4, move || async move {
                        release.notified().await;
                        Err(FetchError::backend("db offline"))
                    })
                    .await
            }));
        }

        while coordinator.in_flight() == 0 {
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        release.notify_one();

        for handle in handles {
            let result = handle.await.expect("join");
            assert_eq!(result, Err(FetchError::backend("db offline")));
        }
        assert!(coordinator.cache().is_empty());

        while coordinator.in_flight() != 0 {
            tokio::task::yield_now().await;
        }

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let retried = coordinator
            .fetch(4, move || {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Ok(Some("recovered".to_string())) }
            })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(retried.source, Source::Fresh);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_loader_clears_registry() {
        let coordinator = coordinator(1);

        let result = coordinator
            .fetch(5, || async {
                if true {
                    panic!("loader blew up");
                }
                Ok(None)
            })
            .await;
        assert!(matches!(
            result,
            Err(FetchError::Queue(corral_core::QueueError::TaskPanicked { .. }))
        ));

        while coordinator.in_flight() != 0 {
            tokio::task::yield_now().await;
        }
        let retried = coordinator
            .fetch(5, || async { Ok(Some("ok".to_string())) })
            .await
            .unwrap();
        assert!(retried.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_detaches_only_the_late_caller() {
        let coordinator = coordinator(1);

        let patient = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move {
                coordinator
                    .fetch(8, || async {
                        tokio::time::sleep(Duration::from_secs(3)).await;
                        Ok(Some("slow".to_string()))
                    })
                    .await
            })
        };
        while coordinator.in_flight() == 0 {
            tokio::task::yield_now().await;
        }

        let impatient = coordinator
            .fetch_with_deadline(
                8,
                || async { Ok(Some("never called".to_string())) },
                Duration::from_secs(1),
            )
            .await;
        assert_eq!(
            impatient,
            Err(FetchError::TimedOut {
                timeout: Duration::from_secs(1)
            })
        );

        let fetched = patient.await.expect("join").unwrap().unwrap();
        assert_eq!(fetched.value, "slow");
        assert_eq!(fetched.source, Source::Fresh);

        while coordinator.in_flight() != 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(coordinator.cache().get(&8), Some("slow".to_string()));
    }

    #[tokio::test]
    async fn test_reset_clears_cache() {
        let coordinator = coordinator(1);
        coordinator.put(1, "a".to_string());
        coordinator.reset();
        assert!(coordinator.cache().is_empty());
        assert_eq!(coordinator.in_flight(), 0);
    }
}
