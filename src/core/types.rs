//! # Core Types Module
//!
//! Domain records shared by the cache layer, the enrichment stage, the task
//! queue and the threshold evaluator. Field names serialize in camelCase and
//! identifiers as `_id` so the same structs round-trip through the document
//! store and the JSON cache payloads.
//!
//! ## Ownership notes
//! - `Reading`s reference their `Device` and `Plant` by id only
//! - `Plant`s reference their `PlantType`, container and area by id; readings
//!   are looked up by plant id, never embedded
//! - `Alert`s are append-only and carry the owner so they can be listed per user

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Generate a new document identifier
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// Sensor metrics a plant type can constrain
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Metric {
    Temperature,
    Humidity,
    SoilMoisture,
    Light,
    UvIndex,
    WaterLevel,
}

impl Metric {
    /// Every tracked metric, in evaluation order
    pub const ALL: [Metric; 6] = [
        Metric::Temperature,
        Metric::Humidity,
        Metric::SoilMoisture,
        Metric::Light,
        Metric::UvIndex,
        Metric::WaterLevel,
    ];

    /// Stable name used in alerts, metric labels and cache payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Temperature => "temperature",
            Metric::Humidity => "humidity",
            Metric::SoilMoisture => "soilMoisture",
            Metric::Light => "light",
            Metric::UvIndex => "uvIndex",
            Metric::WaterLevel => "waterLevel",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side of an acceptable range a value fell on
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RangeViolation {
    BelowMin { min: f64 },
    AboveMax { max: f64 },
}

/// Acceptable `[min, max]` range for one metric. Either bound may be absent.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl MetricRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self {
            min: Some(min),
            max: Some(max),
        }
    }

    /// Compare a value against the range. Bounds are inclusive.
    pub fn check(&self, value: f64) -> Option<RangeViolation> {
        if let Some(min) = self.min {
            if value < min {
                return Some(RangeViolation::BelowMin { min });
            }
        }
        if let Some(max) = self.max {
            if value > max {
                return Some(RangeViolation::AboveMax { max });
            }
        }
        None
    }
}

/// A kind of plant and the conditions it tolerates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlantType {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watering: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lighting: Option<String>,
    #[serde(default)]
    pub ranges: BTreeMap<Metric, MetricRange>,
}

impl PlantType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            family: None,
            description: None,
            watering: None,
            lighting: None,
            ranges: BTreeMap::new(),
        }
    }

    /// Builder-style helper to attach a range
    pub fn with_range(mut self, metric: Metric, range: MetricRange) -> Self {
        self.ranges.insert(metric, range);
        self
    }

    pub fn range(&self, metric: Metric) -> Option<&MetricRange> {
        self.ranges.get(&metric)
    }
}

/// A plant owned by a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plant {
    #[serde(rename = "_id")]
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub plant_type_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_planted: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_harvested: Option<DateTime<Utc>>,
}

impl Plant {
    pub fn new(
        owner_id: impl Into<String>,
        name: impl Into<String>,
        plant_type_id: impl Into<String>,
    ) -> Self {
        Self {
            id: new_id(),
            owner_id: owner_id.into(),
            name: name.into(),
            plant_type_id: plant_type_id.into(),
            container_id: None,
            area_id: None,
            device_id: None,
            date_planted: None,
            date_harvested: None,
        }
    }
}

/// Whether an area is indoors or outdoors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AreaType {
    Indoor,
    Outdoor,
}

/// A named growing area owned by a user. Plants reference it by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Area {
    #[serde(rename = "_id")]
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub area_type: AreaType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Area {
    pub fn new(owner_id: impl Into<String>, name: impl Into<String>, area_type: AreaType) -> Self {
        Self {
            id: new_id(),
            owner_id: owner_id.into(),
            name: name.into(),
            area_type,
            icon: None,
            description: None,
        }
    }
}

/// A shared container shape (pot, bed, planter). Dimensions are optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub radius: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
}

impl Container {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            description: None,
            width: None,
            height: None,
            length: None,
            radius: None,
            volume: None,
        }
    }
}

/// A sensor device registered by a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    #[serde(rename = "_id")]
    pub id: String,
    pub owner_id: String,
    pub mac_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plant_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Device {
    pub fn new(owner_id: impl Into<String>, mac_address: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            owner_id: owner_id.into(),
            mac_address: mac_address.into(),
            plant_id: None,
            created_at: Utc::now(),
        }
    }
}

/// Time-limited access links derived for a reading's images
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageLinks {
    /// Link to the image uploaded with the reading
    pub primary: Option<String>,
    /// Link to the conventionally named derived image (NDVI rendering)
    pub secondary: Option<String>,
}

/// Where a reading is in the enrichment stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EnrichmentStatus {
    #[default]
    Pending,
    Enriched,
    /// At least one enrichment field fell back to its default
    Defaulted,
}

/// Sensor payload as received from a device, before enrichment
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReading {
    pub device_id: String,
    pub plant_id: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub humidity: Option<f64>,
    #[serde(default)]
    pub soil_moisture: Option<f64>,
    #[serde(default)]
    pub light: Option<f64>,
    #[serde(default)]
    pub uv_index: Option<f64>,
    #[serde(default)]
    pub water_level: Option<f64>,
}

/// A persisted sensor reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    #[serde(rename = "_id")]
    pub id: String,
    pub device_id: String,
    pub plant_id: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub humidity: Option<f64>,
    #[serde(default)]
    pub soil_moisture: Option<f64>,
    #[serde(default)]
    pub light: Option<f64>,
    #[serde(default)]
    pub uv_index: Option<f64>,
    #[serde(default)]
    pub water_level: Option<f64>,
    /// Signed links for the image pair; `None` when the reading has no image
    #[serde(default)]
    pub derived_image_links: Option<ImageLinks>,
    /// Illuminance embedded in the image metadata
    #[serde(default)]
    pub image_lux: Option<f64>,
    #[serde(default)]
    pub enrichment: EnrichmentStatus,
    pub created_at: DateTime<Utc>,
}

impl Reading {
    /// Materialize a reading from an inbound payload
    pub fn from_new(new: NewReading, created_at: DateTime<Utc>) -> Self {
        Self {
            id: new_id(),
            device_id: new.device_id,
            plant_id: new.plant_id,
            image: new.image.filter(|name| !name.trim().is_empty()),
            temperature: new.temperature,
            humidity: new.humidity,
            soil_moisture: new.soil_moisture,
            light: new.light,
            uv_index: new.uv_index,
            water_level: new.water_level,
            derived_image_links: None,
            image_lux: None,
            enrichment: EnrichmentStatus::Pending,
            created_at,
        }
    }

    /// Sensor value for a tracked metric, if the device reported it
    pub fn metric(&self, metric: Metric) -> Option<f64> {
        match metric {
            Metric::Temperature => self.temperature,
            Metric::Humidity => self.humidity,
            Metric::SoilMoisture => self.soil_moisture,
            Metric::Light => self.light,
            Metric::UvIndex => self.uv_index,
            Metric::WaterLevel => self.water_level,
        }
    }

    /// All reported metrics with their values
    pub fn metrics(&self) -> impl Iterator<Item = (Metric, f64)> + '_ {
        Metric::ALL
            .into_iter()
            .filter_map(move |metric| self.metric(metric).map(|value| (metric, value)))
    }

    pub fn is_enriched(&self) -> bool {
        self.enrichment != EnrichmentStatus::Pending
    }

    /// Set the enrichment fields. They are written exactly once; a second call
    /// leaves the reading untouched and returns `false`.
    pub fn apply_enrichment(
        &mut self,
        links: Option<ImageLinks>,
        image_lux: f64,
        status: EnrichmentStatus,
    ) -> bool {
        if self.is_enriched() {
            return false;
        }
        self.derived_image_links = links;
        self.image_lux = Some(image_lux);
        self.enrichment = status;
        true
    }
}

/// A threshold violation raised by the evaluator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    #[serde(rename = "_id")]
    pub id: String,
    pub owner_id: String,
    pub plant_id: String,
    pub reading_id: String,
    pub metric: Metric,
    pub value: f64,
    pub message: String,
    pub created_at: DateTime<Utc>,
}
