//! # PlantPulse Worker - Main Entry Point
//!
//! Runs the alert pipeline's consuming side: recovers tasks left unacknowledged
//! by a previous run, then drains the task queue with a fixed-size worker pool
//! that evaluates each reading against its plant type's thresholds.
//!
//! ## Configuration
//! `PLANTPULSE_CONFIG_PATH` points at a YAML file. Without it the defaults are
//! used; in both cases `PLANTPULSE_*` environment variables override single
//! fields (see `PlantPulseConfig::apply_env_overrides`).

use std::sync::Arc;

use anyhow::Context;
use tokio::signal;
use tracing::{error, info, warn};

use plantpulse_core::alerts::AlertEvaluator;
use plantpulse_core::observability::{init_logging, install_prometheus_exporter};
use plantpulse_core::queue::{AlertWorkerPool, PoolConfig, QueueBackend, RedisQueue};
use plantpulse_core::storage::{DocumentStore, MongoDocumentStore};
use plantpulse_core::{system_clock, PlantPulseConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config().await?;

    init_logging(&config.observability.logging).context("failed to initialize logging")?;
    if let Some(addr) = config.observability.metrics_addr {
        install_prometheus_exporter(addr).context("failed to start metrics exporter")?;
    }

    info!("Starting PlantPulse worker");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let pool = match startup(&config).await {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to start worker: {:#}", e);
            return Err(e);
        }
    };

    shutdown_signal().await;

    let stats = pool.shutdown().await;
    info!(
        succeeded = stats.succeeded,
        failed = stats.failed,
        ack_failures = stats.ack_failures,
        "PlantPulse worker shutdown complete"
    );
    Ok(())
}

async fn load_config() -> anyhow::Result<PlantPulseConfig> {
    match std::env::var("PLANTPULSE_CONFIG_PATH") {
        Ok(path) => PlantPulseConfig::load_from_file(&path)
            .await
            .with_context(|| format!("failed to load configuration from {}", path)),
        Err(_) => {
            let mut config = PlantPulseConfig::default();
            config.apply_env_overrides()?;
            config.validate()?;
            Ok(config)
        }
    }
}

/// Connect the document store and the queue, recover orphaned tasks and
/// start the worker pool
async fn startup(config: &PlantPulseConfig) -> anyhow::Result<AlertWorkerPool> {
    let store = MongoDocumentStore::connect(&config.mongo)
        .await
        .context("failed to connect to the document store")?;
    if let Err(e) = store.health_check().await {
        warn!("Document store health check failed: {}", e);
    }
    let store: Arc<dyn DocumentStore> = Arc::new(store);

    let queue = RedisQueue::connect(&config.redis.url, &config.queue.name)
        .await
        .context("failed to connect to the task queue")?;
    let queue: Arc<dyn QueueBackend> = Arc::new(queue);

    let recovered = queue.recover().await.context("failed to recover unacknowledged tasks")?;
    let depth = queue.depth().await?;
    info!(recovered, waiting = depth.waiting, "Task queue ready");

    let evaluator = Arc::new(AlertEvaluator::new(store, system_clock()));
    Ok(AlertWorkerPool::start(queue, evaluator, PoolConfig::from(&config.queue)))
}

/// Wait for SIGINT, or SIGTERM on unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT, initiating graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}
