//! Lecturas sobre un almacén documental
//!
//! Adapta cualquier `DocumentStore` al contrato `FleetReader`, para que el
//! agregador y las consultas funcionen igual con ambos backends.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{Incident, PlaceFilter, Vehicle};
use crate::repositories::store::{DocumentStore, FleetReader};
use crate::utils::errors::StoreError;

pub struct DocumentReader<D: ?Sized> {
    store: Arc<D>,
}

impl<D: DocumentStore + ?Sized> DocumentReader<D> {
    pub fn new(store: Arc<D>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<D: DocumentStore + ?Sized> FleetReader for DocumentReader<D> {
    async fn find_vehicle_by_key(&self, key: &str) -> Result<Option<Vehicle>, StoreError> {
        if let Some(document) = self.store.read_vehicle(key).await? {
            if document.vehicle.is_active() {
                return Ok(Some(document.vehicle));
            }
        }

        let found = self
            .store
            .list_documents()
            .await?
            .into_iter()
            .map(|d| d.vehicle)
            .filter(|v| v.is_active() && v.call_sign == key)
            .max_by_key(|v| v.last_modified);
        Ok(found)
    }

    async fn list_vehicles(&self, filter: &PlaceFilter) -> Result<Vec<Vehicle>, StoreError> {
        Ok(self
            .store
            .list_documents()
            .await?
            .into_iter()
            .map(|d| d.vehicle)
            .filter(|v| v.is_active() && filter.matches(v))
            .collect())
    }

    async fn incidents_between(
        &self,
        vehicle_ids: &[Uuid],
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Incident>, StoreError> {
        Ok(self
            .store
            .list_documents()
            .await?
            .into_iter()
            .filter(|d| vehicle_ids.contains(&d.vehicle.id))
            .flat_map(|d| d.incidents)
            .filter(|i| i.intersects(from, to))
            .collect())
    }
}
