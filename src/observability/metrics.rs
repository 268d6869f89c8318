//! Metric names recorded through the `metrics` facade.
//!
//! Counters are emitted unconditionally; without an installed recorder they
//! are no-ops.

use metrics::{describe_counter, Unit};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

use crate::core::error::{PlantPulseError, PlantPulseResult};

/// Cache reads served from the store, by key family
pub const CACHE_HITS_TOTAL: &str = "plantpulse_cache_hits_total";
/// Cache reads that fell through to the populate function, by key family
pub const CACHE_MISSES_TOTAL: &str = "plantpulse_cache_misses_total";
/// Keys removed by invalidation, by key family
pub const CACHE_INVALIDATIONS_TOTAL: &str = "plantpulse_cache_invalidations_total";
pub const TASKS_ENQUEUED_TOTAL: &str = "plantpulse_tasks_enqueued_total";
/// Tasks finished by the worker pool, by outcome
pub const TASKS_PROCESSED_TOTAL: &str = "plantpulse_tasks_processed_total";
/// Alerts persisted by the threshold evaluator, by metric
pub const ALERTS_EMITTED_TOTAL: &str = "plantpulse_alerts_emitted_total";
/// Enrichment fields that fell back to a default, by field
pub const ENRICHMENT_DEFAULTS_TOTAL: &str = "plantpulse_enrichment_defaults_total";

/// Register descriptions for every counter
pub fn describe_metrics() {
    describe_counter!(CACHE_HITS_TOTAL, Unit::Count, "Cache reads served from the cache store");
    describe_counter!(CACHE_MISSES_TOTAL, Unit::Count, "Cache reads that ran the populate function");
    describe_counter!(CACHE_INVALIDATIONS_TOTAL, Unit::Count, "Cache keys removed by invalidation");
    describe_counter!(TASKS_ENQUEUED_TOTAL, Unit::Count, "Readings enqueued for threshold evaluation");
    describe_counter!(TASKS_PROCESSED_TOTAL, Unit::Count, "Queued tasks finished by the worker pool");
    describe_counter!(ALERTS_EMITTED_TOTAL, Unit::Count, "Threshold alerts persisted");
    describe_counter!(ENRICHMENT_DEFAULTS_TOTAL, Unit::Count, "Enrichment fields that fell back to a default");
}

/// Install the global Prometheus recorder with an HTTP scrape listener
pub fn install_prometheus_exporter(addr: SocketAddr) -> PlantPulseResult<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| PlantPulseError::config(format!("Failed to install Prometheus exporter on {}: {}", addr, e)))?;

    describe_metrics();
    info!(%addr, "Prometheus exporter listening");
    Ok(())
}
