//! # Alert Worker Pool
//!
//! One fetcher task pulls deliveries from the queue backend into a bounded
//! channel; `workers` tasks share the channel's receiver, run the handler and
//! acknowledge. The channel holds at most one delivery per worker, so the
//! active list never runs far ahead of what the pool can process.
//!
//! Shutdown cancels the fetcher, lets the workers drain what is already in
//! the channel, and joins everything.

use super::{Delivery, QueueBackend, QueueConfig, QueuedTask};
use crate::core::error::PlantPulseError;
use crate::observability::metrics::TASKS_PROCESSED_TOTAL;
use async_trait::async_trait;
use futures::FutureExt;
use metrics::counter;
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Work executed for every delivered task
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &QueuedTask) -> Result<(), PlantPulseError>;
}

/// Worker pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub workers: usize,
    pub block_timeout: Duration,
    pub error_backoff: Duration,
}

impl From<&QueueConfig> for PoolConfig {
    fn from(config: &QueueConfig) -> Self {
        Self {
            workers: config.workers.max(1),
            block_timeout: config.block_timeout,
            error_backoff: config.error_backoff,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::from(&QueueConfig::default())
    }
}

/// Processing counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub succeeded: u64,
    pub failed: u64,
    pub ack_failures: u64,
}

#[derive(Default)]
struct Counters {
    succeeded: AtomicU64,
    failed: AtomicU64,
    ack_failures: AtomicU64,
}

/// Running worker pool
pub struct AlertWorkerPool {
    cancel: CancellationToken,
    fetcher: JoinHandle<()>,
    workers: Vec<JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl AlertWorkerPool {
    /// Spawn the fetcher and the workers
    pub fn start(backend: Arc<dyn QueueBackend>, handler: Arc<dyn TaskHandler>, config: PoolConfig) -> Self {
        let workers = config.workers.max(1);
        let cancel = CancellationToken::new();
        let counters = Arc::new(Counters::default());
        let (tx, rx) = mpsc::channel::<Delivery>(workers);
        let rx = Arc::new(Mutex::new(rx));

        let fetcher = tokio::spawn(fetch_loop(backend.clone(), tx, cancel.clone(), config.clone()));

        let workers = (0..workers)
            .map(|worker_id| {
                tokio::spawn(work_loop(
                    worker_id,
                    backend.clone(),
                    handler.clone(),
                    rx.clone(),
                    counters.clone(),
                ))
            })
            .collect::<Vec<_>>();

        info!(workers = workers.len(), "Alert worker pool started");

        Self {
            cancel,
            fetcher,
            workers,
            counters,
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            succeeded: self.counters.succeeded.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            ack_failures: self.counters.ack_failures.load(Ordering::Relaxed),
        }
    }

    /// Token that stops the fetcher when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop fetching, drain in-flight deliveries and join every task
    pub async fn shutdown(self) -> PoolStats {
        info!("Shutting down alert worker pool");
        self.cancel.cancel();

        if let Err(e) = self.fetcher.await {
            error!("Task fetcher terminated abnormally: {}", e);
        }
        for worker in self.workers {
            if let Err(e) = worker.await {
                error!("Worker terminated abnormally: {}", e);
            }
        }

        let stats = PoolStats {
            succeeded: self.counters.succeeded.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            ack_failures: self.counters.ack_failures.load(Ordering::Relaxed),
        };
        info!(?stats, "Alert worker pool stopped");
        stats
    }
}

async fn fetch_loop(
    backend: Arc<dyn QueueBackend>,
    tx: mpsc::Sender<Delivery>,
    cancel: CancellationToken,
    config: PoolConfig,
) {
    loop {
        let fetched = tokio::select! {
            _ = cancel.cancelled() => break,
            fetched = backend.fetch(config.block_timeout) => fetched,
        };

        match fetched {
            Ok(Some(delivery)) => {
                debug!(task_id = %delivery.task.id, "Fetched task");
                if tx.send(delivery).await.is_err() {
                    break;
                }
            }
            Ok(None) => continue,
            Err(e) => {
                warn!(error = %e, "Failed to fetch task, backing off");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(config.error_backoff) => {}
                }
            }
        }
    }
    debug!("Task fetcher stopped");
}

async fn work_loop(
    worker_id: usize,
    backend: Arc<dyn QueueBackend>,
    handler: Arc<dyn TaskHandler>,
    rx: Arc<Mutex<mpsc::Receiver<Delivery>>>,
    counters: Arc<Counters>,
) {
    loop {
        let delivery = {
            let mut rx = rx.lock().await;
            rx.recv().await
        };
        let Some(delivery) = delivery else {
            break;
        };

        let task = &delivery.task;
        let outcome = AssertUnwindSafe(handler.handle(task)).catch_unwind().await;

        let label = match outcome {
            Ok(Ok(())) => {
                counters.succeeded.fetch_add(1, Ordering::Relaxed);
                "succeeded"
            }
            Ok(Err(e)) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(worker_id, task_id = %task.id, reading_ref = %task.reading_ref, error = %e, "Task failed, dropping it");
                "failed"
            }
            Err(_) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                error!(worker_id, task_id = %task.id, reading_ref = %task.reading_ref, "Task handler panicked, dropping it");
                "panicked"
            }
        };
        counter!(TASKS_PROCESSED_TOTAL, "outcome" => label).increment(1);

        if let Err(e) = backend.ack(&delivery).await {
            counters.ack_failures.fetch_add(1, Ordering::Relaxed);
            warn!(worker_id, task_id = %task.id, error = %e, "Failed to acknowledge task, it will be redelivered after recovery");
        }
    }
    debug!(worker_id, "Worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::{MemoryQueue, QueueDepth};
    use parking_lot::Mutex as SyncMutex;

    /// Records handled readings; fails or panics on request
    #[derive(Default)]
    struct RecordingHandler {
        seen: SyncMutex<Vec<String>>,
    }

    #[async_trait]
    impl TaskHandler for RecordingHandler {
        async fn handle(&self, task: &QueuedTask) -> Result<(), PlantPulseError> {
            self.seen.lock().push(task.reading_ref.clone());
            match task.reading_ref.as_str() {
                "fail" => Err(PlantPulseError::internal("evaluation failed")),
                "panic" => panic!("handler bug"),
                _ => Ok(()),
            }
        }
    }

    fn config(workers: usize) -> PoolConfig {
        PoolConfig {
            workers,
            block_timeout: Duration::from_millis(20),
            error_backoff: Duration::from_millis(10),
        }
    }

    async fn wait_for_acks(queue: &MemoryQueue, expected: u64) {
        for _ in 0..200 {
            if queue.acked() >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("timed out waiting for {} acks, saw {}", expected, queue.acked());
    }

    #[tokio::test]
    async fn test_every_task_is_handled_and_acked() {
        let queue = Arc::new(MemoryQueue::new());
        let handler = Arc::new(RecordingHandler::default());
        for i in 0..10 {
            queue.enqueue(&QueuedTask::new(format!("r{}", i))).await.unwrap();
        }

        let pool = AlertWorkerPool::start(queue.clone(), handler.clone(), config(3));
        wait_for_acks(&queue, 10).await;
        let stats = pool.shutdown().await;

        assert_eq!(stats.succeeded, 10);
        assert_eq!(handler.seen.lock().len(), 10);
        assert_eq!(queue.depth().await.unwrap(), QueueDepth::default());
    }

    #[tokio::test]
    async fn test_failed_and_panicking_tasks_are_dropped() {
        let queue = Arc::new(MemoryQueue::new());
        let handler = Arc::new(RecordingHandler::default());
        for reading in ["fail", "panic", "ok"] {
            queue.enqueue(&QueuedTask::new(reading)).await.unwrap();
        }

        let pool = AlertWorkerPool::start(queue.clone(), handler.clone(), config(2));
        wait_for_acks(&queue, 3).await;
        let stats = pool.shutdown().await;

        assert_eq!(stats.succeeded, 1);
        assert_eq!(stats.failed, 2);
        assert_eq!(queue.depth().await.unwrap(), QueueDepth::default());
    }

    #[tokio::test]
    async fn test_shutdown_with_empty_queue_returns_promptly() {
        let queue = Arc::new(MemoryQueue::new());
        let pool = AlertWorkerPool::start(queue, Arc::new(RecordingHandler::default()), config(4));

        let stats = tokio::time::timeout(Duration::from_secs(2), pool.shutdown())
            .await
            .unwrap();
        assert_eq!(stats, PoolStats::default());
    }
}
