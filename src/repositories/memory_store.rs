//! Almacén transaccional en memoria
//!
//! Mismas garantías que Postgres para el núcleo: los escritores se
//! serializan con un mutex asíncrono y trabajan sobre una copia; el `commit`
//! publica la copia como nueva instantánea. Los lectores nunca esperan a un
//! escritor ni ven un lote a medias.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::models::{Incident, PlaceFilter, Vehicle};
use crate::repositories::store::{FleetReader, FleetStore, FleetTransaction};
use crate::utils::errors::StoreError;

#[derive(Debug, Clone, Default)]
struct FleetData {
    vehicles: HashMap<Uuid, Vehicle>,
    incidents: HashMap<Uuid, Incident>,
    marker: Option<NaiveDate>,
}

/// Copia ordenada del estado persistido, comparable en tests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetSnapshot {
    pub vehicles: Vec<Vehicle>,
    pub incidents: Vec<Incident>,
    pub marker: Option<NaiveDate>,
}

#[derive(Clone, Default)]
pub struct MemoryFleetStore {
    published: Arc<RwLock<Arc<FleetData>>>,
    writer: Arc<Mutex<()>>,
}

impl MemoryFleetStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn current(&self) -> Result<Arc<FleetData>, StoreError> {
        self.published
            .read()
            .map(|data| Arc::clone(&*data))
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))
    }

    /// Estado publicado, ordenado por matrícula / (vehículo, inicio)
    pub fn snapshot(&self) -> FleetSnapshot {
        let data = self
            .published
            .read()
            .map(|data| Arc::clone(&*data))
            .unwrap_or_else(|poisoned| Arc::clone(&*poisoned.into_inner()));

        let mut vehicles: Vec<Vehicle> = data.vehicles.values().cloned().collect();
        vehicles.sort_by(|a, b| a.registration.cmp(&b.registration));

        let mut incidents: Vec<Incident> = data.incidents.values().cloned().collect();
        incidents.sort_by_key(|i| (i.vehicle_id, i.start_date));

        FleetSnapshot {
            vehicles,
            incidents,
            marker: data.marker,
        }
    }

    /// Vehículo por matrícula, incluidos los borrados
    pub fn vehicle(&self, registration: &str) -> Option<Vehicle> {
        self.snapshot()
            .vehicles
            .into_iter()
            .find(|v| v.registration == registration)
    }

    pub fn incidents_of(&self, vehicle_id: Uuid) -> Vec<Incident> {
        self.snapshot()
            .incidents
            .into_iter()
            .filter(|i| i.vehicle_id == vehicle_id)
            .collect()
    }
}

#[async_trait]
impl FleetReader for MemoryFleetStore {
    async fn find_vehicle_by_key(&self, key: &str) -> Result<Option<Vehicle>, StoreError> {
        let data = self.current()?;
        let active = || data.vehicles.values().filter(|v| v.is_active());

        let found = active()
            .find(|v| v.registration == key)
            .or_else(|| {
                active()
                    .filter(|v| v.call_sign == key)
                    .max_by_key(|v| v.last_modified)
            })
            .cloned();
        Ok(found)
    }

    async fn list_vehicles(&self, filter: &PlaceFilter) -> Result<Vec<Vehicle>, StoreError> {
        let data = self.current()?;
        let mut vehicles: Vec<Vehicle> = data
            .vehicles
            .values()
            .filter(|v| v.is_active() && filter.matches(v))
            .cloned()
            .collect();
        vehicles.sort_by(|a, b| a.registration.cmp(&b.registration));
        Ok(vehicles)
    }

    async fn incidents_between(
        &self,
        vehicle_ids: &[Uuid],
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Incident>, StoreError> {
        let data = self.current()?;
        Ok(data
            .incidents
            .values()
            .filter(|i| vehicle_ids.contains(&i.vehicle_id) && i.intersects(from, to))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl FleetStore for MemoryFleetStore {
    async fn begin(&self) -> Result<Box<dyn FleetTransaction>, StoreError> {
        let guard = Arc::clone(&self.writer).lock_owned().await;
        let working = (*self.current()?).clone();
        Ok(Box::new(MemoryTransaction {
            published: Arc::clone(&self.published),
            working,
            _guard: guard,
        }))
    }
}

pub struct MemoryTransaction {
    published: Arc<RwLock<Arc<FleetData>>>,
    working: FleetData,
    _guard: OwnedMutexGuard<()>,
}

#[async_trait]
impl FleetTransaction for MemoryTransaction {
    async fn resync_marker(&mut self) -> Result<Option<NaiveDate>, StoreError> {
        Ok(self.working.marker)
    }

    async fn set_resync_marker(&mut self, date: NaiveDate) -> Result<(), StoreError> {
        self.working.marker = Some(date);
        Ok(())
    }

    async fn clear_off_road(
        &mut self,
        modified_at: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, StoreError> {
        let mut cleared = Vec::new();
        for vehicle in self
            .working
            .vehicles
            .values_mut()
            .filter(|v| v.is_active() && v.is_off_road)
        {
            vehicle.is_off_road = false;
            vehicle.last_modified = modified_at;
            cleared.push(vehicle.id);
        }
        Ok(cleared)
    }

    async fn stamp_version_tokens(&mut self, tokens: &[(Uuid, String)]) -> Result<(), StoreError> {
        for (id, token) in tokens {
            if let Some(vehicle) = self.working.vehicles.get_mut(id) {
                vehicle.version_token = token.clone();
            }
        }
        Ok(())
    }

    async fn find_vehicle_by_registration(
        &mut self,
        registration: &str,
    ) -> Result<Option<Vehicle>, StoreError> {
        Ok(self
            .working
            .vehicles
            .values()
            .find(|v| v.registration == registration)
            .cloned())
    }

    async fn save_vehicle(
        &mut self,
        vehicle: &Vehicle,
        expected_token: Option<&str>,
    ) -> Result<(), StoreError> {
        match expected_token {
            None => {
                let duplicate = self
                    .working
                    .vehicles
                    .values()
                    .any(|v| v.id == vehicle.id || v.registration == vehicle.registration);
                if duplicate {
                    return Err(StoreError::Conflict(format!(
                        "vehicle {} already exists",
                        vehicle.registration
                    )));
                }
            }
            Some(expected) => {
                let current = self.working.vehicles.get(&vehicle.id).ok_or_else(|| {
                    StoreError::Conflict(format!(
                        "vehicle {} no longer exists",
                        vehicle.registration
                    ))
                })?;
                if current.version_token != expected {
                    return Err(StoreError::Conflict(format!(
                        "vehicle {} was modified concurrently",
                        vehicle.registration
                    )));
                }
            }
        }
        self.working.vehicles.insert(vehicle.id, vehicle.clone());
        Ok(())
    }

    async fn find_incident(
        &mut self,
        vehicle_id: Uuid,
        start_date: NaiveDate,
    ) -> Result<Option<Incident>, StoreError> {
        Ok(self
            .working
            .incidents
            .values()
            .find(|i| i.vehicle_id == vehicle_id && i.start_date == start_date)
            .cloned())
    }

    async fn save_incident(&mut self, incident: &Incident) -> Result<(), StoreError> {
        if !self.working.vehicles.contains_key(&incident.vehicle_id) {
            return Err(StoreError::Backend(format!(
                "incident {} references unknown vehicle {}",
                incident.id, incident.vehicle_id
            )));
        }
        let duplicate = self.working.incidents.values().any(|i| {
            i.id != incident.id
                && i.vehicle_id == incident.vehicle_id
                && i.start_date == incident.start_date
        });
        if duplicate {
            return Err(StoreError::Conflict(format!(
                "incident starting {} already exists for vehicle {}",
                incident.start_date, incident.vehicle_id
            )));
        }
        self.working.incidents.insert(incident.id, incident.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTransaction {
            published,
            working,
            _guard,
        } = *self;
        let mut slot = published
            .write()
            .map_err(|_| StoreError::Backend("memory store lock poisoned".to_string()))?;
        *slot = Arc::new(working);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
