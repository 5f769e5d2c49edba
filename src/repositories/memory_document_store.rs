//! Almacén documental en memoria
//!
//! Un documento por matrícula; las escrituras condicionales comparan el
//! token almacenado con el esperado bajo el mismo cerrojo.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::models::{ConditionalWrite, VehicleDocument};
use crate::repositories::store::DocumentStore;
use crate::utils::errors::StoreError;

#[derive(Default)]
pub struct MemoryDocumentStore {
    documents: RwLock<HashMap<String, VehicleDocument>>,
    marker: RwLock<Option<NaiveDate>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn check_precondition(
    documents: &HashMap<String, VehicleDocument>,
    write: &ConditionalWrite,
) -> Result<(), StoreError> {
    let registration = write.document.registration();
    let current = documents.get(registration).map(VehicleDocument::version_token);
    match (current, write.expected_token.as_deref()) {
        (None, None) => Ok(()),
        (Some(current), Some(expected)) if current == expected => Ok(()),
        (Some(_), None) => Err(StoreError::Conflict(format!(
            "vehicle {} already exists",
            registration
        ))),
        _ => Err(StoreError::Conflict(format!(
            "vehicle {} was modified concurrently",
            registration
        ))),
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn read_vehicle(
        &self,
        registration: &str,
    ) -> Result<Option<VehicleDocument>, StoreError> {
        Ok(self.documents.read().await.get(registration).cloned())
    }

    async fn write_vehicle(&self, write: &ConditionalWrite) -> Result<(), StoreError> {
        let mut documents = self.documents.write().await;
        check_precondition(&documents, write)?;
        documents.insert(write.document.registration().to_string(), write.document.clone());
        Ok(())
    }

    async fn write_batch(&self, writes: &[ConditionalWrite]) -> Result<(), StoreError> {
        let mut documents = self.documents.write().await;
        for write in writes {
            check_precondition(&documents, write)?;
        }
        for write in writes {
            documents.insert(write.document.registration().to_string(), write.document.clone());
        }
        Ok(())
    }

    async fn list_documents(&self) -> Result<Vec<VehicleDocument>, StoreError> {
        let mut documents: Vec<VehicleDocument> =
            self.documents.read().await.values().cloned().collect();
        documents.sort_by(|a, b| a.registration().cmp(b.registration()));
        Ok(documents)
    }

    async fn resync_marker(&self) -> Result<Option<NaiveDate>, StoreError> {
        Ok(*self.marker.read().await)
    }

    async fn advance_resync_marker(&self, date: NaiveDate) -> Result<bool, StoreError> {
        let mut marker = self.marker.write().await;
        if marker.map_or(true, |current| date > current) {
            *marker = Some(date);
            return Ok(true);
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Vehicle;
    use chrono::Utc;

    fn write(document: &VehicleDocument, expected: Option<&str>) -> ConditionalWrite {
        ConditionalWrite {
            document: document.clone(),
            expected_token: expected.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_create_then_conditional_replace() {
        let store = MemoryDocumentStore::new();
        let document = VehicleDocument::new(Vehicle::new("AB12CDE", "WR1", Utc::now()));

        store.write_vehicle(&write(&document, None)).await.unwrap();
        assert!(store.write_vehicle(&write(&document, None)).await.unwrap_err().is_conflict());

        let token = document.version_token().to_string();
        let mut updated = document.clone();
        updated.vehicle.is_off_road = true;
        updated.vehicle.touch(Utc::now() + chrono::Duration::seconds(1));

        store.write_vehicle(&write(&updated, Some(&token))).await.unwrap();
        // El token antiguo ya no sirve
        let stale = store.write_vehicle(&write(&updated, Some(&token))).await;
        assert!(stale.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn test_batch_is_all_or_nothing() {
        let store = MemoryDocumentStore::new();
        let a = VehicleDocument::new(Vehicle::new("AAA111", "A1", Utc::now()));
        let b = VehicleDocument::new(Vehicle::new("BBB222", "B1", Utc::now()));
        store.write_vehicle(&write(&a, None)).await.unwrap();

        let result = store
            .write_batch(&[write(&b, None), write(&a, Some("stale"))])
            .await;
        assert!(result.unwrap_err().is_conflict());
        assert!(store.read_vehicle("BBB222").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resync_marker_never_moves_back() {
        let store = MemoryDocumentStore::new();
        let day = |d| NaiveDate::from_ymd_opt(2024, 1, d).unwrap();

        assert!(store.advance_resync_marker(day(11)).await.unwrap());
        assert!(!store.advance_resync_marker(day(10)).await.unwrap());
        assert!(!store.advance_resync_marker(day(11)).await.unwrap());
        assert_eq!(store.resync_marker().await.unwrap(), Some(day(11)));

        assert!(store.advance_resync_marker(day(12)).await.unwrap());
        assert_eq!(store.resync_marker().await.unwrap(), Some(day(12)));
    }
}
