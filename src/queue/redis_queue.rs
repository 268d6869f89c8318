//! Redis list queue.
//!
//! `LPUSH <name>:wait` to enqueue, `BLMOVE <name>:wait <name>:active RIGHT LEFT`
//! to fetch, `LREM <name>:active 1 <payload>` to acknowledge. Blocking fetches
//! run on their own connection so they never stall enqueues and acks sharing
//! the command connection.

use super::{Delivery, QueueBackend, QueueDepth, QueueResult, QueuedTask};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Client;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Redis-backed queue
pub struct RedisQueue {
    wait_key: String,
    active_key: String,
    commands: ConnectionManager,
    blocking: ConnectionManager,
}

impl RedisQueue {
    /// Connect to `url` and use the lists of queue `name`
    pub async fn connect(url: &str, name: &str) -> QueueResult<Self> {
        let client = Client::open(url)?;
        let commands = ConnectionManager::new(client.clone()).await?;
        let blocking = ConnectionManager::new(client).await?;

        info!("Task queue '{}' connected to {}", name, url);

        Ok(Self {
            wait_key: format!("{}:wait", name),
            active_key: format!("{}:active", name),
            commands,
            blocking,
        })
    }

    pub fn wait_key(&self) -> &str {
        &self.wait_key
    }

    pub fn active_key(&self) -> &str {
        &self.active_key
    }

    /// Drop an undecodable payload from the active list
    async fn discard(&self, payload: &str) -> QueueResult<()> {
        let mut conn = self.commands.clone();
        redis::cmd("LREM")
            .arg(&self.active_key)
            .arg(1)
            .arg(payload)
            .query_async::<_, i64>(&mut conn)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl QueueBackend for RedisQueue {
    async fn enqueue(&self, task: &QueuedTask) -> QueueResult<()> {
        let payload = task.encode()?;
        let mut conn = self.commands.clone();

        let length: i64 = redis::cmd("LPUSH")
            .arg(&self.wait_key)
            .arg(&payload)
            .query_async(&mut conn)
            .await?;

        debug!(task_id = %task.id, reading_ref = %task.reading_ref, length, "Enqueued task");
        Ok(())
    }

    async fn fetch(&self, timeout: Duration) -> QueueResult<Option<Delivery>> {
        let mut conn = self.blocking.clone();

        let payload: Option<String> = redis::cmd("BLMOVE")
            .arg(&self.wait_key)
            .arg(&self.active_key)
            .arg("RIGHT")
            .arg("LEFT")
            .arg(timeout.as_secs_f64())
            .query_async(&mut conn)
            .await?;

        let Some(payload) = payload else {
            return Ok(None);
        };

        match QueuedTask::decode(&payload) {
            Ok(task) => Ok(Some(Delivery { task, payload })),
            Err(e) => {
                warn!(error = %e, payload = %payload, "Dropping undecodable task payload");
                self.discard(&payload).await?;
                Ok(None)
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> QueueResult<()> {
        let mut conn = self.commands.clone();

        let removed: i64 = redis::cmd("LREM")
            .arg(&self.active_key)
            .arg(1)
            .arg(&delivery.payload)
            .query_async(&mut conn)
            .await?;

        if removed == 0 {
            warn!(task_id = %delivery.task.id, "Acknowledged task was not in the active list");
        }
        Ok(())
    }

    async fn recover(&self) -> QueueResult<usize> {
        let mut conn = self.commands.clone();
        let mut recovered = 0usize;

        // newest first onto the consuming end, so the oldest ends up next in line
        loop {
            let moved: Option<String> = redis::cmd("LMOVE")
                .arg(&self.active_key)
                .arg(&self.wait_key)
                .arg("LEFT")
                .arg("RIGHT")
                .query_async(&mut conn)
                .await?;

            if moved.is_none() {
                break;
            }
            recovered += 1;
        }

        if recovered > 0 {
            info!("Recovered {} unacknowledged tasks", recovered);
        }
        Ok(recovered)
    }

    async fn depth(&self) -> QueueResult<QueueDepth> {
        let mut conn = self.commands.clone();
        let mut pipe = redis::pipe();
        pipe.cmd("LLEN").arg(&self.wait_key).cmd("LLEN").arg(&self.active_key);
        let (waiting, active): (usize, usize) = pipe.query_async(&mut conn).await?;

        Ok(QueueDepth { waiting, active })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_queue(name: &str) -> RedisQueue {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let queue = RedisQueue::connect(&url, name).await.unwrap();

        let mut conn = queue.commands.clone();
        redis::cmd("DEL")
            .arg(queue.wait_key())
            .arg(queue.active_key())
            .query_async::<_, i64>(&mut conn)
            .await
            .unwrap();
        queue
    }

    #[tokio::test]
    #[ignore] // Requires a running Redis (REDIS_URL)
    async fn test_fifo_fetch_and_ack() {
        let queue = setup_queue("plantpulse-test:fifo").await;
        queue.enqueue(&QueuedTask::new("r1")).await.unwrap();
        queue.enqueue(&QueuedTask::new("r2")).await.unwrap();

        let first = queue.fetch(Duration::from_secs(1)).await.unwrap().unwrap();
        assert_eq!(first.task.reading_ref, "r1");
        assert_eq!(queue.depth().await.unwrap(), QueueDepth { waiting: 1, active: 1 });

        queue.ack(&first).await.unwrap();
        assert_eq!(queue.depth().await.unwrap(), QueueDepth { waiting: 1, active: 0 });
    }

    #[tokio::test]
    #[ignore] // Requires a running Redis (REDIS_URL)
    async fn test_unacked_task_is_redelivered_after_recover() {
        let queue = setup_queue("plantpulse-test:recover").await;
        queue.enqueue(&QueuedTask::new("r1")).await.unwrap();
        queue.enqueue(&QueuedTask::new("r2")).await.unwrap();

        let a = queue.fetch(Duration::from_secs(1)).await.unwrap().unwrap();
        let b = queue.fetch(Duration::from_secs(1)).await.unwrap().unwrap();
        assert_eq!(queue.recover().await.unwrap(), 2);

        let again = queue.fetch(Duration::from_secs(1)).await.unwrap().unwrap();
        assert_eq!(again, a);
        let again = queue.fetch(Duration::from_secs(1)).await.unwrap().unwrap();
        assert_eq!(again, b);
    }

    #[tokio::test]
    #[ignore] // Requires a running Redis (REDIS_URL)
    async fn test_fetch_times_out_on_empty_queue() {
        let queue = setup_queue("plantpulse-test:empty").await;
        assert!(queue.fetch(Duration::from_millis(200)).await.unwrap().is_none());
    }
}
