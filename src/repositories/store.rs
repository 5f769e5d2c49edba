//! Contrato de almacenamiento
//!
//! El núcleo depende de estos traits, no de una base de datos concreta:
//! - `FleetReader`: consultas de solo lectura (no bloquean a los escritores)
//! - `FleetStore` + `FleetTransaction`: lectura-modificación-escritura
//!   transaccional (Postgres, memoria)
//! - `DocumentStore`: un documento por vehículo con escrituras condicionales
//!   por token (Redis, memoria)

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use crate::models::{ConditionalWrite, Incident, PlaceFilter, Vehicle, VehicleDocument};
use crate::utils::errors::StoreError;

#[async_trait]
pub trait FleetReader: Send + Sync {
    /// Vehículo activo por matrícula o indicativo (clave ya normalizada).
    /// Si ambas coinciden en vehículos distintos, gana la matrícula.
    async fn find_vehicle_by_key(&self, key: &str) -> Result<Option<Vehicle>, StoreError>;

    /// Vehículos activos (no borrados) dentro del alcance
    async fn list_vehicles(&self, filter: &PlaceFilter) -> Result<Vec<Vehicle>, StoreError>;

    /// Incidentes de esos vehículos cuyo intervalo toca [from, to]
    async fn incidents_between(
        &self,
        vehicle_ids: &[Uuid],
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Incident>, StoreError>;
}

#[async_trait]
pub trait FleetStore: FleetReader {
    /// Abrir una unidad atómica; sin `commit` no se publica nada
    async fn begin(&self) -> Result<Box<dyn FleetTransaction>, StoreError>;
}

#[async_trait]
pub trait FleetTransaction: Send {
    async fn resync_marker(&mut self) -> Result<Option<NaiveDate>, StoreError>;

    async fn set_resync_marker(&mut self, date: NaiveDate) -> Result<(), StoreError>;

    /// Limpiar en bloque el indicador "fuera de servicio" de los vehículos
    /// activos; devuelve los ids afectados (con `last_modified` ya fijado)
    async fn clear_off_road(&mut self, modified_at: DateTime<Utc>) -> Result<Vec<Uuid>, StoreError>;

    async fn stamp_version_tokens(&mut self, tokens: &[(Uuid, String)]) -> Result<(), StoreError>;

    /// Incluye vehículos borrados (para poder restaurarlos)
    async fn find_vehicle_by_registration(
        &mut self,
        registration: &str,
    ) -> Result<Option<Vehicle>, StoreError>;

    /// `expected_token == None` inserta; en otro caso actualiza solo si el
    /// token almacenado coincide (si no, `StoreError::Conflict`)
    async fn save_vehicle(
        &mut self,
        vehicle: &Vehicle,
        expected_token: Option<&str>,
    ) -> Result<(), StoreError>;

    async fn find_incident(
        &mut self,
        vehicle_id: Uuid,
        start_date: NaiveDate,
    ) -> Result<Option<Incident>, StoreError>;

    async fn save_incident(&mut self, incident: &Incident) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn read_vehicle(
        &self,
        registration: &str,
    ) -> Result<Option<VehicleDocument>, StoreError>;

    /// Escritura condicional de un único documento
    async fn write_vehicle(&self, write: &ConditionalWrite) -> Result<(), StoreError>;

    /// Escritura condicional de varios documentos: todas o ninguna
    async fn write_batch(&self, writes: &[ConditionalWrite]) -> Result<(), StoreError>;

    async fn list_documents(&self) -> Result<Vec<VehicleDocument>, StoreError>;

    async fn resync_marker(&self) -> Result<Option<NaiveDate>, StoreError>;

    /// Avanzar el marcador a `date` solo si es posterior al guardado,
    /// de forma atómica. Devuelve si avanzó.
    async fn advance_resync_marker(&self, date: NaiveDate) -> Result<bool, StoreError>;
}
