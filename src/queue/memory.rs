//! In-process queue with the same wait/active/ack contract as the Redis
//! queue. `recover()` stands in for a worker restart after a crash.

use super::{Delivery, QueueBackend, QueueDepth, QueueError, QueueResult, QueuedTask};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// In-memory queue
#[derive(Default)]
pub struct MemoryQueue {
    lists: Mutex<Lists>,
    available: Notify,
    acked: AtomicU64,
    fail_enqueue: AtomicBool,
}

#[derive(Default)]
struct Lists {
    /// Oldest at the front
    wait: VecDeque<String>,
    active: Vec<String>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acknowledgements received so far
    pub fn acked(&self) -> u64 {
        self.acked.load(Ordering::Relaxed)
    }

    pub fn set_fail_enqueue(&self, fail: bool) {
        self.fail_enqueue.store(fail, Ordering::Relaxed);
    }

    /// Push a raw payload, bypassing encoding
    pub fn push_raw(&self, payload: impl Into<String>) {
        self.lists.lock().wait.push_back(payload.into());
        self.available.notify_one();
    }

    fn try_take(&self) -> Option<Delivery> {
        let mut lists = self.lists.lock();
        while let Some(payload) = lists.wait.pop_front() {
            match QueuedTask::decode(&payload) {
                Ok(task) => {
                    lists.active.push(payload.clone());
                    return Some(Delivery { task, payload });
                }
                Err(e) => tracing::warn!(error = %e, "Dropping undecodable task payload"),
            }
        }
        None
    }
}

#[async_trait]
impl QueueBackend for MemoryQueue {
    async fn enqueue(&self, task: &QueuedTask) -> QueueResult<()> {
        if self.fail_enqueue.load(Ordering::Relaxed) {
            return Err(QueueError::Unavailable {
                message: "enqueue rejected".to_string(),
            });
        }
        let payload = task.encode()?;
        self.push_raw(payload);
        Ok(())
    }

    async fn fetch(&self, timeout: Duration) -> QueueResult<Option<Delivery>> {
        let deadline = Instant::now() + timeout;

        loop {
            let notified = self.available.notified();
            if let Some(delivery) = self.try_take() {
                return Ok(Some(delivery));
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(self.try_take());
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> QueueResult<()> {
        let mut lists = self.lists.lock();
        if let Some(position) = lists.active.iter().position(|p| *p == delivery.payload) {
            lists.active.remove(position);
        }
        self.acked.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn recover(&self) -> QueueResult<usize> {
        let recovered = {
            let mut lists = self.lists.lock();
            let active: Vec<String> = lists.active.drain(..).collect();
            let recovered = active.len();
            // recovered tasks go ahead of anything still waiting, oldest first
            for payload in active.into_iter().rev() {
                lists.wait.push_front(payload);
            }
            recovered
        };

        for _ in 0..recovered {
            self.available.notify_one();
        }
        Ok(recovered)
    }

    async fn depth(&self) -> QueueResult<QueueDepth> {
        let lists = self.lists.lock();
        Ok(QueueDepth {
            waiting: lists.wait.len(),
            active: lists.active.len(),
        })
    }
}
