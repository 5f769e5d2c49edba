//! Fachada de la flota
//!
//! Un único punto de entrada para la capa HTTP, independiente del almacén
//! elegido (transaccional o documental).

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::debug;

use crate::cache::VersionToken;
use crate::models::{
    AvailabilitySeries, IncidentReport, PlaceFilter, ReconcileSummary, Resolution, Vehicle,
    VehicleSettings,
};
use crate::repositories::{DocumentReader, DocumentStore, FleetReader, FleetStore};
use crate::services::availability::AvailabilityAggregator;
use crate::services::document_reconciler::{DocumentIngestConfig, DocumentReconciler};
use crate::services::ingest::IncidentIngestor;
use crate::services::reconciler::Reconciler;
use crate::services::retry_writer::RetryPolicy;
use crate::services::settings::{DocumentSettings, TransactionalSettings, VehicleSettingsWriter};
use crate::utils::errors::{AppError, ReconcileError, StoreError};
use crate::utils::validation::normalize_key;
use crate::utils::Clock;

pub struct FleetService {
    reader: Arc<dyn FleetReader>,
    ingestor: Arc<dyn IncidentIngestor>,
    settings: Arc<dyn VehicleSettingsWriter>,
    aggregator: AvailabilityAggregator,
    clock: Arc<dyn Clock>,
}

impl FleetService {
    /// Fachada sobre un almacén transaccional (Postgres o memoria)
    pub fn transactional<S: FleetStore + 'static>(
        store: Arc<S>,
        clock: Arc<dyn Clock>,
        retry: RetryPolicy,
    ) -> Self {
        let reader: Arc<dyn FleetReader> = store.clone();
        let ingestor =
            Reconciler::new(Arc::clone(&store), Arc::clone(&clock)).with_retry_policy(retry);
        let settings = TransactionalSettings::new(store, Arc::clone(&clock));
        Self::assemble(reader, Arc::new(ingestor), Arc::new(settings), clock)
    }

    /// Fachada sobre un almacén documental (Redis o memoria)
    pub fn document<D: DocumentStore + 'static>(
        store: Arc<D>,
        clock: Arc<dyn Clock>,
        config: DocumentIngestConfig,
    ) -> Self {
        let reader: Arc<dyn FleetReader> = Arc::new(DocumentReader::new(Arc::clone(&store)));
        let ingestor = DocumentReconciler::new(Arc::clone(&store), Arc::clone(&clock), config);
        let settings = DocumentSettings::new(store, Arc::clone(&clock), config.retry);
        Self::assemble(reader, Arc::new(ingestor), Arc::new(settings), clock)
    }

    fn assemble(
        reader: Arc<dyn FleetReader>,
        ingestor: Arc<dyn IncidentIngestor>,
        settings: Arc<dyn VehicleSettingsWriter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            aggregator: AvailabilityAggregator::new(Arc::clone(&reader)),
            reader,
            ingestor,
            settings,
            clock,
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// Reconciliar un lote de reportes de incidentes
    pub async fn reconcile_batch(
        &self,
        reports: Vec<IncidentReport>,
    ) -> Result<ReconcileSummary, ReconcileError> {
        self.ingestor.ingest(reports).await
    }

    /// Buscar un vehículo activo por matrícula o indicativo
    ///
    /// La matrícula gana; entre indicativos repetidos, el modificado más
    /// recientemente. Una clave vacía no encuentra nada.
    pub async fn get_vehicle_by_key(&self, key: &str) -> Result<Option<Vehicle>, StoreError> {
        let key = normalize_key(key);
        if key.is_empty() {
            return Ok(None);
        }
        self.reader.find_vehicle_by_key(&key).await
    }

    pub async fn get_vehicle_version_token(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.get_vehicle_by_key(key).await?.map(|v| v.version_token))
    }

    /// Estadísticas de disponibilidad (por defecto, a día de hoy)
    pub async fn get_availability_statistics(
        &self,
        scope: &PlaceFilter,
        as_of: Option<NaiveDate>,
        resolution: Resolution,
    ) -> Result<AvailabilitySeries, AppError> {
        let as_of = as_of.unwrap_or_else(|| self.today());
        self.aggregator.compute(scope, as_of, resolution).await
    }

    /// Token de versión de todos los vehículos activos del alcance
    pub async fn get_scope_version_token(
        &self,
        scope: &PlaceFilter,
        salt: Option<&str>,
    ) -> Result<String, StoreError> {
        let vehicles = self.reader.list_vehicles(scope).await?;
        let token = VersionToken::compute(vehicles.iter().map(|v| (v.id, v.last_modified)), salt);
        debug!("🔖 Token de {} ({} vehículos): {}", scope.describe(), vehicles.len(), token);
        Ok(token)
    }

    /// Token de las estadísticas: el del alcance salado con la fecha de hoy.
    /// Una fecha de consulta explícita o la resolución mensual también
    /// entran en la sal.
    pub async fn get_statistics_version_token(
        &self,
        scope: &PlaceFilter,
        as_of: Option<NaiveDate>,
        resolution: Resolution,
    ) -> Result<String, StoreError> {
        let mut salt = self.today().format("%Y-%m-%d").to_string();
        if let Some(as_of) = as_of {
            salt.push_str(&format!(":{}", as_of));
        }
        if resolution == Resolution::Monthly {
            salt.push_str(":monthly");
        }
        self.get_scope_version_token(scope, Some(&salt)).await
    }

    pub async fn vehicles_in_scope(&self, scope: &PlaceFilter) -> Result<Vec<Vehicle>, StoreError> {
        self.reader.list_vehicles(scope).await
    }

    pub async fn upsert_vehicle_settings(
        &self,
        registration: &str,
        settings: &VehicleSettings,
    ) -> Result<Vehicle, AppError> {
        self.settings.upsert(registration, settings).await
    }

    pub async fn delete_vehicle(&self, registration: &str) -> Result<Vehicle, AppError> {
        self.settings.soft_delete(registration).await
    }
}
