//! # Alert Task Queue
//!
//! Durable, at-least-once work queue that decouples reading ingestion from
//! threshold evaluation. Producers `enqueue` a [`QueuedTask`] naming a reading
//! and return as soon as the backing store has accepted it; a fixed-size
//! [`AlertWorkerPool`] pulls tasks, runs the handler and acknowledges each
//! task only after the handler returns.
//!
//! ## Delivery semantics
//! A fetched task moves from the wait list to an active list and leaves the
//! active list on acknowledgement. A worker that dies between the two leaves
//! the task in the active list; [`QueueBackend::recover`] moves such tasks
//! back to the wait list on the next start, so the task is delivered again.
//! Handlers must therefore tolerate running twice for the same reading.
//!
//! Handler failures are logged and the task is acknowledged anyway: there is
//! no retry and no dead-letter list.

pub mod memory;
pub mod redis_queue;
pub mod worker_pool;

pub use memory::MemoryQueue;
pub use redis_queue::RedisQueue;
pub use worker_pool::{AlertWorkerPool, PoolConfig, PoolStats, TaskHandler};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::types::new_id;

/// Queue operation result
pub type QueueResult<T> = Result<T, QueueError>;

/// Queue errors
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Task payload could not be encoded or decoded: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("Queue unavailable: {message}")]
    Unavailable { message: String },
}

impl QueueError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Redis(err) => err.is_io_error() || err.is_connection_dropped() || err.is_timeout(),
            Self::Unavailable { .. } => true,
            Self::Payload(_) => false,
        }
    }
}

/// Queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QueueConfig {
    /// Queue name; Redis lists are `<name>:wait` and `<name>:active`
    pub name: String,

    /// Number of concurrent workers
    pub workers: usize,

    /// How long a single fetch blocks waiting for a task
    #[serde(with = "humantime_serde")]
    pub block_timeout: Duration,

    /// Pause after a failed fetch before trying again
    #[serde(with = "humantime_serde")]
    pub error_backoff: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: "taskQueue".to_string(),
            workers: 4,
            block_timeout: Duration::from_secs(5),
            error_backoff: Duration::from_secs(1),
        }
    }
}

/// The payload handed to the queue: a reference to a persisted reading
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedTask {
    /// Unique per enqueue, so acknowledging one task never removes a twin
    pub id: String,

    /// Identifier of the reading to evaluate
    pub reading_ref: String,

    pub enqueued_at: DateTime<Utc>,
}

impl QueuedTask {
    pub fn new(reading_ref: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            reading_ref: reading_ref.into(),
            enqueued_at: Utc::now(),
        }
    }

    pub fn encode(&self) -> QueueResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(payload: &str) -> QueueResult<Self> {
        Ok(serde_json::from_str(payload)?)
    }
}

/// A fetched task, not yet acknowledged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub task: QueuedTask,

    /// The exact payload as stored, used to acknowledge it
    pub payload: String,
}

/// Task counts per list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueDepth {
    pub waiting: usize,
    pub active: usize,
}

/// Durable queue backend
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Append a task; returns once the store has accepted it
    async fn enqueue(&self, task: &QueuedTask) -> QueueResult<()>;

    /// Take the oldest waiting task, blocking up to `timeout`.
    /// The task stays pending until acknowledged.
    async fn fetch(&self, timeout: Duration) -> QueueResult<Option<Delivery>>;

    /// Mark a delivery complete
    async fn ack(&self, delivery: &Delivery) -> QueueResult<()>;

    /// Return every unacknowledged task to the wait list. Call only while no
    /// consumer is running.
    async fn recover(&self) -> QueueResult<usize>;

    async fn depth(&self) -> QueueResult<QueueDepth>;
}
