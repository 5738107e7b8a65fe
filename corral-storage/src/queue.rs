//! Bounded-concurrency work queue.
//!
//! A fixed pool of `concurrency` workers pulls jobs off an unbounded FIFO
//! channel. Each worker runs one job to completion before taking the next,
//! so at most `concurrency` jobs execute at once and waiting jobs start in
//! submission order. Dispatch is a plain loop per worker; nothing recurses
//! on completion.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use corral_core::{CorralResult, QueueConfig, QueueError};
use futures_util::FutureExt;
use tokio::sync::{mpsc, oneshot, Mutex};

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Generic concurrency limiter for backing-store work.
pub struct BoundedWorkQueue {
    sender: mpsc::UnboundedSender<Job>,
    concurrency: usize,
    executing: Arc<AtomicUsize>,
    queued: Arc<AtomicUsize>,
}

impl BoundedWorkQueue {
    /// Create the queue and spawn its workers.
    ///
    /// # Panics
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: &QueueConfig) -> CorralResult<Self> {
        config.validate()?;

        let (sender, receiver) = mpsc::unbounded_channel::<Job>();
        let receiver = Arc::new(Mutex::new(receiver));
        let executing = Arc::new(AtomicUsize::new(0));
        let queued = Arc::new(AtomicUsize::new(0));

        for worker_id in 0..config.concurrency {
            tokio::spawn(worker_loop(
                worker_id,
                Arc::clone(&receiver),
                Arc::clone(&executing),
                Arc::clone(&queued),
            ));
        }

        tracing::debug!(concurrency = config.concurrency, "Work queue started");

        Ok(Self {
            sender,
            concurrency: config.concurrency,
            executing,
            queued,
        })
    }

    /// Run `task` once a slot is free and return its output.
    ///
    /// A panic inside `task` is reported as [`QueueError::TaskPanicked`] to
    /// this caller only. Dropping the returned future does not cancel the
    /// task once it has been queued.
    pub async fn submit<T, F>(&self, task: F) -> Result<T, QueueError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let receiver = self.enqueue(task)?;
        match receiver.await {
            Ok(outcome) => outcome,
            Err(_) => Err(QueueError::Closed),
        }
    }

    /// Like [`submit`](Self::submit), but stop waiting after `timeout`.
    ///
    /// The task itself keeps its place in the queue and still runs; only
    /// this caller is detached.
    pub async fn submit_with_deadline<T, F>(
        &self,
        task: F,
        timeout: Duration,
    ) -> Result<T, QueueError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        tokio::time::timeout(timeout, self.submit(task))
            .await
            .unwrap_or(Err(QueueError::TimedOut { timeout }))
    }

    fn enqueue<T, F>(&self, task: F) -> Result<oneshot::Receiver<Result<T, QueueError>>, QueueError>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            let outcome = AssertUnwindSafe(task)
                .catch_unwind()
                .await
                .map_err(|payload| QueueError::TaskPanicked {
                    message: panic_message(&*payload),
                });
            // The submitter may have given up waiting.
            let _ = tx.send(outcome);
        });

        self.queued.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(job).is_err() {
            self.queued.fetch_sub(1, Ordering::SeqCst);
            return Err(QueueError::Closed);
        }
        Ok(rx)
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Number of jobs currently running.
    pub fn executing(&self) -> usize {
        self.executing.load(Ordering::SeqCst)
    }

    /// Number of jobs waiting for a worker.
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }
}

async fn worker_loop(
    worker_id: usize,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<Job>>>,
    executing: Arc<AtomicUsize>,
    queued: Arc<AtomicUsize>,
) {
    loop {
        // Idle workers line up on the mutex; whoever holds it takes the next job.
        let job = {
            let mut receiver = receiver.lock().await;
            receiver.recv().await
        };
        let Some(job) = job else {
            break;
        };

        queued.fetch_sub(1, Ordering::SeqCst);
        executing.fetch_add(1, Ordering::SeqCst);
        job.await;
        executing.fetch_sub(1, Ordering::SeqCst);
    }

    tracing::trace!(worker_id, "Work queue worker stopped");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "task panicked".to_string()
    }
}
