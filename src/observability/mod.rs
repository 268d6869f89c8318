//! # Observability
//!
//! Structured logging through `tracing` and counters through the `metrics`
//! facade, optionally scraped by a Prometheus exporter.

// Logging and exporter configuration
pub mod config;

// Structured logging
pub mod logging;

// Metric names and the Prometheus exporter
pub mod metrics;

pub use config::{LogConfig, LogFormat, ObservabilityConfig};
pub use logging::init_logging;
pub use metrics::install_prometheus_exporter;
