//! MongoDB-backed document store.

use super::{collections, DocumentStore, StoreError, StoreResult};
use crate::core::types::{Alert, Area, Container, Device, Plant, PlantType, Reading};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::options::{FindOptions, ReplaceOptions};
use mongodb::{Client, Collection, Database};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// MongoDB connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MongoConfig {
    /// Connection string (`mongodb://` or `mongodb+srv://`)
    pub uri: String,

    /// Database holding the PlantPulse collections
    pub database: String,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            uri: "mongodb://127.0.0.1:27017".to_string(),
            database: "plantpulse".to_string(),
        }
    }
}

impl From<mongodb::error::Error> for StoreError {
    fn from(err: mongodb::error::Error) -> Self {
        StoreError::Backend {
            message: err.to_string(),
        }
    }
}

/// MongoDB document store
pub struct MongoDocumentStore {
    database: Database,
}

impl MongoDocumentStore {
    /// Connect and select the configured database
    pub async fn connect(config: &MongoConfig) -> StoreResult<Self> {
        let client = Client::with_uri_str(&config.uri).await?;
        let database = client.database(&config.database);

        info!("Connected to MongoDB database '{}'", config.database);
        Ok(Self { database })
    }

    fn collection<T>(&self, name: &str) -> Collection<T> {
        self.database.collection::<T>(name)
    }

    async fn find_by_id<T>(&self, name: &str, id: &str) -> StoreResult<Option<T>>
    where
        T: DeserializeOwned + Unpin + Send + Sync,
    {
        Ok(self.collection::<T>(name).find_one(doc! { "_id": id }, None).await?)
    }

    async fn find_all<T>(&self, name: &str, filter: Document, options: Option<FindOptions>) -> StoreResult<Vec<T>>
    where
        T: DeserializeOwned + Unpin + Send + Sync,
    {
        let cursor = self.collection::<T>(name).find(filter, options).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn upsert<T>(&self, name: &str, id: &str, document: &T) -> StoreResult<()>
    where
        T: Serialize + Send + Sync,
    {
        let options = ReplaceOptions::builder().upsert(true).build();
        self.collection::<T>(name)
            .replace_one(doc! { "_id": id }, document, options)
            .await?;
        Ok(())
    }
}

/// Case-insensitive substring filter on `name`
fn name_filter(search: Option<&str>) -> Document {
    match search.map(str::trim).filter(|q| !q.is_empty()) {
        Some(query) => doc! { "name": { "$regex": regex::escape(query), "$options": "i" } },
        None => doc! {},
    }
}

#[async_trait]
impl DocumentStore for MongoDocumentStore {
    async fn plant_type(&self, id: &str) -> StoreResult<Option<PlantType>> {
        self.find_by_id(collections::PLANT_TYPES, id).await
    }

    async fn plant_types_page(&self, page: u32, page_size: u32, search: Option<&str>) -> StoreResult<Vec<PlantType>> {
        let options = FindOptions::builder()
            .sort(doc! { "name": 1 })
            .skip(u64::from(page) * u64::from(page_size))
            .limit(i64::from(page_size))
            .build();

        self.find_all(collections::PLANT_TYPES, name_filter(search), Some(options))
            .await
    }

    async fn insert_plant_type(&self, plant_type: &PlantType) -> StoreResult<()> {
        self.collection::<PlantType>(collections::PLANT_TYPES)
            .insert_one(plant_type, None)
            .await?;
        Ok(())
    }

    async fn replace_plant_type(&self, plant_type: &PlantType) -> StoreResult<()> {
        let result = self
            .collection::<PlantType>(collections::PLANT_TYPES)
            .replace_one(doc! { "_id": &plant_type.id }, plant_type, None)
            .await?;

        if result.matched_count == 0 {
            return Err(StoreError::not_found(collections::PLANT_TYPES, &plant_type.id));
        }
        Ok(())
    }

    async fn plant(&self, id: &str) -> StoreResult<Option<Plant>> {
        self.find_by_id(collections::PLANTS, id).await
    }

    async fn plants_for_owner(&self, owner_id: &str) -> StoreResult<Vec<Plant>> {
        let options = FindOptions::builder().sort(doc! { "name": 1 }).build();
        self.find_all(collections::PLANTS, doc! { "ownerId": owner_id }, Some(options))
            .await
    }

    async fn save_plant(&self, plant: &Plant) -> StoreResult<()> {
        self.upsert(collections::PLANTS, &plant.id, plant).await
    }

    async fn delete_plant(&self, id: &str) -> StoreResult<Option<Plant>> {
        Ok(self
            .collection::<Plant>(collections::PLANTS)
            .find_one_and_delete(doc! { "_id": id }, None)
            .await?)
    }

    async fn plants_in_area(&self, area_id: &str) -> StoreResult<Vec<Plant>> {
        self.find_all(collections::PLANTS, doc! { "areaId": area_id }, None).await
    }

    async fn area(&self, id: &str) -> StoreResult<Option<Area>> {
        self.find_by_id(collections::AREAS, id).await
    }

    async fn areas_for_owner(&self, owner_id: &str) -> StoreResult<Vec<Area>> {
        let options = FindOptions::builder().sort(doc! { "name": 1 }).build();
        self.find_all(collections::AREAS, doc! { "ownerId": owner_id }, Some(options))
            .await
    }

    async fn insert_area(&self, area: &Area) -> StoreResult<()> {
        self.collection::<Area>(collections::AREAS).insert_one(area, None).await?;
        Ok(())
    }

    async fn delete_area(&self, id: &str) -> StoreResult<Option<Area>> {
        Ok(self
            .collection::<Area>(collections::AREAS)
            .find_one_and_delete(doc! { "_id": id }, None)
            .await?)
    }

    async fn containers(&self) -> StoreResult<Vec<Container>> {
        let options = FindOptions::builder().sort(doc! { "name": 1 }).build();
        self.find_all(collections::CONTAINERS, doc! {}, Some(options)).await
    }

    async fn insert_container(&self, container: &Container) -> StoreResult<()> {
        self.collection::<Container>(collections::CONTAINERS)
            .insert_one(container, None)
            .await?;
        Ok(())
    }

    async fn device(&self, id: &str) -> StoreResult<Option<Device>> {
        self.find_by_id(collections::DEVICES, id).await
    }

    async fn devices_for_owner(&self, owner_id: &str) -> StoreResult<Vec<Device>> {
        let options = FindOptions::builder().sort(doc! { "createdAt": 1 }).build();
        self.find_all(collections::DEVICES, doc! { "ownerId": owner_id }, Some(options))
            .await
    }

    async fn save_device(&self, device: &Device) -> StoreResult<()> {
        self.upsert(collections::DEVICES, &device.id, device).await
    }

    async fn reading(&self, id: &str) -> StoreResult<Option<Reading>> {
        self.find_by_id(collections::READINGS, id).await
    }

    async fn insert_reading(&self, reading: &Reading) -> StoreResult<()> {
        self.collection::<Reading>(collections::READINGS)
            .insert_one(reading, None)
            .await?;
        debug!(reading_id = %reading.id, "Inserted reading");
        Ok(())
    }

    async fn insert_alert(&self, alert: &Alert) -> StoreResult<()> {
        self.collection::<Alert>(collections::ALERTS)
            .insert_one(alert, None)
            .await?;
        Ok(())
    }

    async fn alerts_for_plant(&self, plant_id: &str) -> StoreResult<Vec<Alert>> {
        let options = FindOptions::builder().sort(doc! { "createdAt": 1 }).build();
        self.find_all(collections::ALERTS, doc! { "plantId": plant_id }, Some(options))
            .await
    }

    async fn health_check(&self) -> StoreResult<bool> {
        self.database.run_command(doc! { "ping": 1 }, None).await?;
        Ok(true)
    }
}
