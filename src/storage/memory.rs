//! In-process document store for tests and local runs.
//!
//! Keeps per-collection maps and counts lookups so tests can assert whether a
//! read was served by the cache or fell through to the store.

use super::{collections, DocumentStore, StoreError, StoreResult};
use crate::core::types::{Alert, Area, Container, Device, Plant, PlantType, Reading};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// In-memory document store
#[derive(Default)]
pub struct MemoryDocumentStore {
    plant_types: DashMap<String, PlantType>,
    plants: DashMap<String, Plant>,
    devices: DashMap<String, Device>,
    areas: DashMap<String, Area>,
    containers: DashMap<String, Container>,
    readings: DashMap<String, Reading>,
    alerts: Mutex<Vec<Alert>>,

    /// Number of lookups served, across every collection
    reads: AtomicU64,

    /// When set, every write fails with a backend error
    fail_writes: AtomicBool,

    /// When set, alert inserts fail with a backend error
    fail_alert_inserts: AtomicBool,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lookups served so far
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    pub fn set_fail_alert_inserts(&self, fail: bool) {
        self.fail_alert_inserts.store(fail, Ordering::Relaxed);
    }

    /// Every stored alert, in insertion order
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().clone()
    }

    pub fn reading_count(&self) -> usize {
        self.readings.len()
    }

    fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    fn duplicate(collection: &str, id: &str) -> StoreError {
        StoreError::Backend {
            message: format!("duplicate key '{}' in {}", id, collection),
        }
    }

    fn check_write(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(StoreError::Backend {
                message: "write rejected".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn plant_type(&self, id: &str) -> StoreResult<Option<PlantType>> {
        self.record_read();
        Ok(self.plant_types.get(id).map(|entry| entry.clone()))
    }

    async fn plant_types_page(&self, page: u32, page_size: u32, search: Option<&str>) -> StoreResult<Vec<PlantType>> {
        self.record_read();

        let needle = search
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(str::to_lowercase);

        let mut matching: Vec<PlantType> = self
            .plant_types
            .iter()
            .filter(|entry| match &needle {
                Some(needle) => entry.name.to_lowercase().contains(needle.as_str()),
                None => true,
            })
            .map(|entry| entry.clone())
            .collect();
        matching.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));

        let skip = page as usize * page_size as usize;
        Ok(matching.into_iter().skip(skip).take(page_size as usize).collect())
    }

    async fn insert_plant_type(&self, plant_type: &PlantType) -> StoreResult<()> {
        self.check_write()?;
        if self.plant_types.contains_key(&plant_type.id) {
            return Err(Self::duplicate(collections::PLANT_TYPES, &plant_type.id));
        }
        self.plant_types.insert(plant_type.id.clone(), plant_type.clone());
        Ok(())
    }

    async fn replace_plant_type(&self, plant_type: &PlantType) -> StoreResult<()> {
        self.check_write()?;
        match self.plant_types.get_mut(&plant_type.id) {
            Some(mut existing) => {
                *existing = plant_type.clone();
                Ok(())
            }
            None => Err(StoreError::not_found(collections::PLANT_TYPES, &plant_type.id)),
        }
    }

    async fn plant(&self, id: &str) -> StoreResult<Option<Plant>> {
        self.record_read();
        Ok(self.plants.get(id).map(|entry| entry.clone()))
    }

    async fn plants_for_owner(&self, owner_id: &str) -> StoreResult<Vec<Plant>> {
        self.record_read();
        let mut plants: Vec<Plant> = self
            .plants
            .iter()
            .filter(|entry| entry.owner_id == owner_id)
            .map(|entry| entry.clone())
            .collect();
        plants.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(plants)
    }

    async fn save_plant(&self, plant: &Plant) -> StoreResult<()> {
        self.check_write()?;
        self.plants.insert(plant.id.clone(), plant.clone());
        Ok(())
    }

    async fn delete_plant(&self, id: &str) -> StoreResult<Option<Plant>> {
        self.check_write()?;
        Ok(self.plants.remove(id).map(|(_, plant)| plant))
    }

    async fn plants_in_area(&self, area_id: &str) -> StoreResult<Vec<Plant>> {
        self.record_read();
        Ok(self
            .plants
            .iter()
            .filter(|entry| entry.area_id.as_deref() == Some(area_id))
            .map(|entry| entry.clone())
            .collect())
    }

    async fn area(&self, id: &str) -> StoreResult<Option<Area>> {
        self.record_read();
        Ok(self.areas.get(id).map(|entry| entry.clone()))
    }

    async fn areas_for_owner(&self, owner_id: &str) -> StoreResult<Vec<Area>> {
        self.record_read();
        let mut areas: Vec<Area> = self
            .areas
            .iter()
            .filter(|entry| entry.owner_id == owner_id)
            .map(|entry| entry.clone())
            .collect();
        areas.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(areas)
    }

    async fn insert_area(&self, area: &Area) -> StoreResult<()> {
        self.check_write()?;
        if self.areas.contains_key(&area.id) {
            return Err(Self::duplicate(collections::AREAS, &area.id));
        }
        self.areas.insert(area.id.clone(), area.clone());
        Ok(())
    }

    async fn delete_area(&self, id: &str) -> StoreResult<Option<Area>> {
        self.check_write()?;
        Ok(self.areas.remove(id).map(|(_, area)| area))
    }

    async fn containers(&self) -> StoreResult<Vec<Container>> {
        self.record_read();
        let mut containers: Vec<Container> = self.containers.iter().map(|entry| entry.clone()).collect();
        containers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(containers)
    }

    async fn insert_container(&self, container: &Container) -> StoreResult<()> {
        self.check_write()?;
        if self.containers.contains_key(&container.id) {
            return Err(Self::duplicate(collections::CONTAINERS, &container.id));
        }
        self.containers.insert(container.id.clone(), container.clone());
        Ok(())
    }

    async fn device(&self, id: &str) -> StoreResult<Option<Device>> {
        self.record_read();
        Ok(self.devices.get(id).map(|entry| entry.clone()))
    }

    async fn devices_for_owner(&self, owner_id: &str) -> StoreResult<Vec<Device>> {
        self.record_read();
        let mut devices: Vec<Device> = self
            .devices
            .iter()
            .filter(|entry| entry.owner_id == owner_id)
            .map(|entry| entry.clone())
            .collect();
        devices.sort_by_key(|device| device.created_at);
        Ok(devices)
    }

    async fn save_device(&self, device: &Device) -> StoreResult<()> {
        self.check_write()?;
        self.devices.insert(device.id.clone(), device.clone());
        Ok(())
    }

    async fn reading(&self, id: &str) -> StoreResult<Option<Reading>> {
        self.record_read();
        Ok(self.readings.get(id).map(|entry| entry.clone()))
    }

    async fn insert_reading(&self, reading: &Reading) -> StoreResult<()> {
        self.check_write()?;
        self.readings.insert(reading.id.clone(), reading.clone());
        Ok(())
    }

    async fn insert_alert(&self, alert: &Alert) -> StoreResult<()> {
        self.check_write()?;
        if self.fail_alert_inserts.load(Ordering::Relaxed) {
            return Err(StoreError::Backend {
                message: "alert insert rejected".to_string(),
            });
        }
        self.alerts.lock().push(alert.clone());
        Ok(())
    }

    async fn alerts_for_plant(&self, plant_id: &str) -> StoreResult<Vec<Alert>> {
        self.record_read();
        Ok(self
            .alerts
            .lock()
            .iter()
            .filter(|alert| alert.plant_id == plant_id)
            .cloned()
            .collect())
    }

    async fn health_check(&self) -> StoreResult<bool> {
        Ok(true)
    }
}
