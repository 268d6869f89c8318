//! # Threshold Evaluator
//!
//! Resolves a queued reading to its plant and plant type, compares every
//! reported sensor metric against the plant type's acceptable range and
//! persists one [`Alert`] per violation.
//!
//! Alerts are not deduplicated: evaluating the same reading twice (a queue
//! redelivery) stores the alerts twice. A reading, plant or plant type that
//! cannot be resolved ends the task without alerts.

use std::sync::Arc;

use crate::core::clock::SharedClock;
use crate::core::error::PlantPulseError;
use crate::core::types::{new_id, Alert, Metric, Plant, RangeViolation, Reading};
use crate::observability::metrics::ALERTS_EMITTED_TOTAL;
use crate::queue::{QueuedTask, TaskHandler};
use crate::storage::{DocumentStore, StoreError};
use async_trait::async_trait;
use metrics::counter;
use tracing::{debug, info, warn};

/// Evaluator errors
#[derive(Debug, thiserror::Error)]
pub enum EvaluatorError {
    #[error("failed to load {what} '{id}': {source}")]
    Lookup {
        what: &'static str,
        id: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to store alert for reading '{reading_id}': {source}")]
    AlertWrite {
        reading_id: String,
        #[source]
        source: StoreError,
    },
}

/// Why a task ended without evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unresolved {
    Reading,
    Plant,
    PlantType,
}

/// Result of evaluating one reading
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    /// Metrics were compared; the alerts raised (possibly none)
    Evaluated(Vec<Alert>),
    /// A referenced document was missing; nothing was compared
    Skipped(Unresolved),
}

impl Evaluation {
    pub fn alerts(&self) -> &[Alert] {
        match self {
            Self::Evaluated(alerts) => alerts,
            Self::Skipped(_) => &[],
        }
    }
}

/// Human-readable alert text
pub fn violation_message(metric: Metric, value: f64, violation: RangeViolation) -> String {
    match violation {
        RangeViolation::BelowMin { min } => {
            format!("{} reading {} is below the minimum of {}", metric, value, min)
        }
        RangeViolation::AboveMax { max } => {
            format!("{} reading {} is above the maximum of {}", metric, value, max)
        }
    }
}

/// The threshold evaluator
pub struct AlertEvaluator {
    store: Arc<dyn DocumentStore>,
    clock: SharedClock,
}

impl AlertEvaluator {
    pub fn new(store: Arc<dyn DocumentStore>, clock: SharedClock) -> Self {
        Self { store, clock }
    }

    /// Evaluate the reading with id `reading_id`
    pub async fn evaluate(&self, reading_id: &str) -> Result<Evaluation, EvaluatorError> {
        let Some(reading) = self.lookup("reading", reading_id, self.store.reading(reading_id).await)? else {
            warn!(reading_id, "Reading not found, skipping evaluation");
            return Ok(Evaluation::Skipped(Unresolved::Reading));
        };

        let Some(plant) = self.lookup("plant", &reading.plant_id, self.store.plant(&reading.plant_id).await)? else {
            warn!(reading_id, plant_id = %reading.plant_id, "Plant not found, skipping evaluation");
            return Ok(Evaluation::Skipped(Unresolved::Plant));
        };

        let Some(plant_type) = self.lookup(
            "plant type",
            &plant.plant_type_id,
            self.store.plant_type(&plant.plant_type_id).await,
        )?
        else {
            warn!(reading_id, plant_type_id = %plant.plant_type_id, "Plant type not found, skipping evaluation");
            return Ok(Evaluation::Skipped(Unresolved::PlantType));
        };

        let mut alerts = Vec::new();
        for (metric, value) in reading.metrics() {
            let Some(range) = plant_type.range(metric) else {
                continue;
            };
            if let Some(violation) = range.check(value) {
                let alert = self.alert(&reading, &plant, metric, value, violation);
                self.store
                    .insert_alert(&alert)
                    .await
                    .map_err(|source| EvaluatorError::AlertWrite {
                        reading_id: reading.id.clone(),
                        source,
                    })?;
                counter!(ALERTS_EMITTED_TOTAL, "metric" => metric.as_str()).increment(1);
                alerts.push(alert);
            }
        }

        if alerts.is_empty() {
            debug!(reading_id, "Reading within range");
        } else {
            info!(reading_id, plant_id = %plant.id, alerts = alerts.len(), "Raised alerts");
        }
        Ok(Evaluation::Evaluated(alerts))
    }

    fn lookup<T>(&self, what: &'static str, id: &str, result: Result<Option<T>, StoreError>) -> Result<Option<T>, EvaluatorError> {
        result.map_err(|source| EvaluatorError::Lookup {
            what,
            id: id.to_string(),
            source,
        })
    }

    fn alert(&self, reading: &Reading, plant: &Plant, metric: Metric, value: f64, violation: RangeViolation) -> Alert {
        Alert {
            id: new_id(),
            owner_id: plant.owner_id.clone(),
            plant_id: plant.id.clone(),
            reading_id: reading.id.clone(),
            metric,
            value,
            message: violation_message(metric, value, violation),
            created_at: self.clock.now(),
        }
    }
}

#[async_trait]
impl TaskHandler for AlertEvaluator {
    async fn handle(&self, task: &QueuedTask) -> Result<(), PlantPulseError> {
        self.evaluate(&task.reading_ref).await?;
        Ok(())
    }
}
