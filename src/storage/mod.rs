//! # Document Store Module
//!
//! The upstream data store the cache fronts. Documents are looked up by id or
//! by a simple filter; references between documents (plant → plant type,
//! plant → area, device → plant) are resolved by explicit follow-up lookups, never joins.
//!
//! Two implementations: [`MongoDocumentStore`] for deployments and
//! [`MemoryDocumentStore`] for tests and local runs.

pub mod memory;
pub mod mongo;

pub use memory::MemoryDocumentStore;
pub use mongo::{MongoConfig, MongoDocumentStore};

use crate::core::types::{Alert, Area, Container, Device, Plant, PlantType, Reading};
use async_trait::async_trait;

/// Page size of the plant type listing
pub const PLANT_TYPE_PAGE_SIZE: u32 = 50;

/// Collection names
pub mod collections {
    pub const PLANT_TYPES: &str = "plantTypes";
    pub const PLANTS: &str = "plants";
    pub const DEVICES: &str = "devices";
    pub const AREAS: &str = "areas";
    pub const CONTAINERS: &str = "containers";
    pub const READINGS: &str = "readings";
    pub const ALERTS: &str = "tasks";
}

/// Document store operation result
pub type StoreResult<T> = Result<T, StoreError>;

/// Document store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{collection} document '{id}' not found")]
    NotFound { collection: &'static str, id: String },

    #[error("Document store backend error: {message}")]
    Backend { message: String },

    #[error("Document serialization error: {message}")]
    Serialization { message: String },
}

impl StoreError {
    pub fn not_found(collection: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            collection,
            id: id.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Document lookups and writes used by the catalog, ingestion and evaluator.
///
/// Single-document lookups return `Ok(None)` for a missing id; callers decide
/// whether absence is an error.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn plant_type(&self, id: &str) -> StoreResult<Option<PlantType>>;

    /// One page (zero-based) of plant types sorted by name, optionally
    /// filtered by a case-insensitive substring match on the name
    async fn plant_types_page(&self, page: u32, page_size: u32, search: Option<&str>) -> StoreResult<Vec<PlantType>>;

    async fn insert_plant_type(&self, plant_type: &PlantType) -> StoreResult<()>;

    /// Replace an existing plant type; `NotFound` if it does not exist
    async fn replace_plant_type(&self, plant_type: &PlantType) -> StoreResult<()>;

    async fn plant(&self, id: &str) -> StoreResult<Option<Plant>>;

    async fn plants_for_owner(&self, owner_id: &str) -> StoreResult<Vec<Plant>>;

    /// Insert or replace
    async fn save_plant(&self, plant: &Plant) -> StoreResult<()>;

    /// Remove a plant, returning the removed document
    async fn delete_plant(&self, id: &str) -> StoreResult<Option<Plant>>;

    /// Plants placed in an area, any owner
    async fn plants_in_area(&self, area_id: &str) -> StoreResult<Vec<Plant>>;

    async fn area(&self, id: &str) -> StoreResult<Option<Area>>;

    /// Areas owned by a user, sorted by name
    async fn areas_for_owner(&self, owner_id: &str) -> StoreResult<Vec<Area>>;

    async fn insert_area(&self, area: &Area) -> StoreResult<()>;

    /// Remove an area, returning the removed document. Plants keep their
    /// `area_id` until the caller clears it.
    async fn delete_area(&self, id: &str) -> StoreResult<Option<Area>>;

    /// Every container, sorted by name
    async fn containers(&self) -> StoreResult<Vec<Container>>;

    async fn insert_container(&self, container: &Container) -> StoreResult<()>;

    async fn device(&self, id: &str) -> StoreResult<Option<Device>>;

    async fn devices_for_owner(&self, owner_id: &str) -> StoreResult<Vec<Device>>;

    /// Insert or replace
    async fn save_device(&self, device: &Device) -> StoreResult<()>;

    async fn reading(&self, id: &str) -> StoreResult<Option<Reading>>;

    async fn insert_reading(&self, reading: &Reading) -> StoreResult<()>;

    async fn insert_alert(&self, alert: &Alert) -> StoreResult<()>;

    /// Alerts raised for a plant, oldest first
    async fn alerts_for_plant(&self, plant_id: &str) -> StoreResult<Vec<Alert>>;

    async fn health_check(&self) -> StoreResult<bool>;
}
