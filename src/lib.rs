//! # PlantPulse Core Library
//!
//! Cache-consistency layer and asynchronous alert pipeline behind the
//! PlantPulse plant-monitoring dashboard.
//!
//! ## Data flow
//! - Reads of plant types, plants and devices go through a cache-aside
//!   [`CacheManager`]; every write through the [`Catalog`] invalidates the
//!   exact keys and key families it could have made stale.
//! - A new sensor reading enters the [`IngestionPipeline`]: its image is
//!   uploaded, the reading is enriched with image links and image metadata,
//!   persisted, and a reference to it is enqueued.
//! - The [`AlertWorkerPool`] drains the queue and runs the
//!   [`AlertEvaluator`], which stores one alert per out-of-range metric.
//!
//! Every external system sits behind a trait (`CacheStore`, `DocumentStore`,
//! `ObjectStore`, `QueueBackend`) with a Redis/MongoDB/MinIO implementation
//! and an in-memory one used by the tests.

/// Configuration, error types, clock and domain types
pub mod core;

/// Cache-aside façade, key builders and pattern invalidation
pub mod caching;

/// Cached reads and invalidating writes of catalog documents
pub mod catalog;

/// Upstream document store
pub mod storage;

/// Object storage and presigned links
pub mod objects;

/// Reading enrichment stage
pub mod enrichment;

/// Reading ingestion pipeline
pub mod ingest;

/// Durable alert task queue and worker pool
pub mod queue;

/// Threshold evaluator
pub mod alerts;

/// Logging and metrics
pub mod observability;

pub use crate::core::clock::{system_clock, Clock, ManualClock, SharedClock};
pub use crate::core::config::PlantPulseConfig;
pub use crate::core::error::{PlantPulseError, PlantPulseResult};
pub use crate::core::types::{
    Alert, Area, AreaType, Container, Device, EnrichmentStatus, ImageLinks, Metric, MetricRange, NewReading, Plant, PlantType, Reading,
};

pub use alerts::{AlertEvaluator, Evaluation};
pub use caching::{CacheConfig, CacheManager, CacheStore};
pub use catalog::Catalog;
pub use enrichment::{EnrichmentOutcome, ReadingEnricher};
pub use ingest::{ImageUpload, IngestionPipeline};
pub use objects::ObjectStore;
pub use queue::{AlertWorkerPool, QueueBackend, QueuedTask};
pub use storage::DocumentStore;
