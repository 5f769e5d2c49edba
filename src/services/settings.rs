//! Ajustes de vehículos
//!
//! Alta o edición directa de los atributos editables (indicativo, lugar,
//! baja) y borrado lógico. Fuera de la reconciliación, pero con las mismas
//! precondiciones de concurrencia que ella.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};
use validator::Validate;

use crate::models::{Region, Vehicle, VehicleDocument, VehicleSettings};
use crate::repositories::{DocumentStore, FleetStore, FleetTransaction};
use crate::services::retry_writer::{ConcurrencyRetryWriter, RetryPolicy};
use crate::utils::errors::{not_found_error, AppError};
use crate::utils::validation::{non_blank, normalize_key};
use crate::utils::Clock;

#[async_trait]
pub trait VehicleSettingsWriter: Send + Sync {
    async fn upsert(
        &self,
        registration: &str,
        settings: &VehicleSettings,
    ) -> Result<Vehicle, AppError>;

    async fn soft_delete(&self, registration: &str) -> Result<Vehicle, AppError>;
}

/// Ajustes ya validados
///
/// `None` deja el campo como está; `Some(None)` lo vacía.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SettingsPatch {
    call_sign: Option<String>,
    body_type: Option<Option<String>>,
    make: Option<Option<String>>,
    model: Option<Option<String>>,
    region: Option<Option<String>>,
    district: Option<Option<String>>,
    hub: Option<Option<String>>,
    is_for_disposal: Option<bool>,
}

impl SettingsPatch {
    pub fn resolve(settings: &VehicleSettings) -> Result<Self, AppError> {
        settings.validate()?;

        let region = match settings.region.as_deref().map(str::trim) {
            None => None,
            Some("") => Some(None),
            Some(raw) => {
                let region: Region = raw.parse()?;
                if region == Region::All {
                    return Err(AppError::InvalidInput(
                        "A vehicle must belong to a specific region".to_string(),
                    ));
                }
                Some(Some(region.as_str().to_string()))
            }
        };

        Ok(Self {
            call_sign: settings.call_sign.as_deref().map(normalize_key),
            body_type: settings.body_type.clone().map(|v| non_blank(Some(v))),
            make: settings.make.clone().map(|v| non_blank(Some(v))),
            model: settings.model.clone().map(|v| non_blank(Some(v))),
            region,
            district: settings.district.clone().map(|v| non_blank(Some(v))),
            hub: settings.hub.clone().map(|v| non_blank(Some(v))),
            is_for_disposal: settings.is_for_disposal,
        })
    }

    pub fn call_sign(&self) -> Option<&str> {
        self.call_sign.as_deref()
    }

    pub fn apply(&self, vehicle: &mut Vehicle) {
        if let Some(call_sign) = &self.call_sign {
            vehicle.call_sign = call_sign.clone();
        }
        let fields = [
            (&mut vehicle.body_type, &self.body_type),
            (&mut vehicle.make, &self.make),
            (&mut vehicle.model, &self.model),
            (&mut vehicle.region, &self.region),
            (&mut vehicle.district, &self.district),
            (&mut vehicle.hub, &self.hub),
        ];
        for (target, value) in fields {
            if let Some(value) = value {
                *target = value.clone();
            }
        }
        if let Some(flag) = self.is_for_disposal {
            vehicle.is_for_disposal = flag;
        }
        // Editar un vehículo borrado lo restaura
        vehicle.deleted_at = None;
    }
}

fn registration_key(registration: &str) -> Result<String, AppError> {
    let key = normalize_key(registration);
    if key.is_empty() {
        return Err(AppError::InvalidInput("Registration must not be blank".to_string()));
    }
    Ok(key)
}

fn missing_call_sign(registration: &str) -> AppError {
    AppError::InvalidInput(format!(
        "Vehicle '{}' does not exist; a call sign is required to register it",
        registration
    ))
}

/// Ajustes sobre el almacén transaccional
pub struct TransactionalSettings<S: ?Sized> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
}

impl<S: FleetStore + ?Sized> TransactionalSettings<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Confirmar o revertir según el resultado de la operación
    async fn finish(
        &self,
        tx: Box<dyn FleetTransaction>,
        operation: &str,
        registration: &str,
        result: Result<Vehicle, AppError>,
    ) -> Result<Vehicle, AppError> {
        match result {
            Ok(vehicle) => {
                tx.commit().await?;
                info!("✅ {} aplicado a {}", operation, registration);
                Ok(vehicle)
            }
            Err(e) => {
                error!("❌ {} fallido para {}: {}", operation, registration, e);
                if let Err(rollback_error) = tx.rollback().await {
                    warn!("⚠️ Error al revertir la transacción: {}", rollback_error);
                }
                Err(e)
            }
        }
    }
}

async fn upsert_in(
    tx: &mut dyn FleetTransaction,
    registration: &str,
    patch: &SettingsPatch,
    now: DateTime<Utc>,
) -> Result<Vehicle, AppError> {
    match tx.find_vehicle_by_registration(registration).await? {
        Some(mut vehicle) => {
            let read_token = vehicle.version_token.clone();
            patch.apply(&mut vehicle);
            vehicle.touch(now);
            tx.save_vehicle(&vehicle, Some(&read_token)).await?;
            Ok(vehicle)
        }
        None => {
            let call_sign = patch.call_sign().ok_or_else(|| missing_call_sign(registration))?;
            let mut vehicle = Vehicle::new(registration, call_sign, now);
            patch.apply(&mut vehicle);
            vehicle.touch(now);
            tx.save_vehicle(&vehicle, None).await?;
            Ok(vehicle)
        }
    }
}

async fn soft_delete_in(
    tx: &mut dyn FleetTransaction,
    registration: &str,
    now: DateTime<Utc>,
) -> Result<Vehicle, AppError> {
    let mut vehicle = tx
        .find_vehicle_by_registration(registration)
        .await?
        .filter(Vehicle::is_active)
        .ok_or_else(|| not_found_error("Vehicle", registration))?;
    let read_token = vehicle.version_token.clone();
    vehicle.deleted_at = Some(now);
    vehicle.touch(now);
    tx.save_vehicle(&vehicle, Some(&read_token)).await?;
    Ok(vehicle)
}

#[async_trait]
impl<S: FleetStore + ?Sized + 'static> VehicleSettingsWriter for TransactionalSettings<S> {
    async fn upsert(
        &self,
        registration: &str,
        settings: &VehicleSettings,
    ) -> Result<Vehicle, AppError> {
        let patch = SettingsPatch::resolve(settings)?;
        let registration = registration_key(registration)?;
        let now = self.clock.now();

        let mut tx = self.store.begin().await?;
        let result = upsert_in(tx.as_mut(), &registration, &patch, now).await;
        self.finish(tx, "Ajustes", &registration, result).await
    }

    async fn soft_delete(&self, registration: &str) -> Result<Vehicle, AppError> {
        let registration = registration_key(registration)?;
        let now = self.clock.now();

        let mut tx = self.store.begin().await?;
        let result = soft_delete_in(tx.as_mut(), &registration, now).await;
        self.finish(tx, "Borrado", &registration, result).await
    }
}

/// Ajustes sobre el almacén documental, con reintentos por concurrencia
pub struct DocumentSettings<D: ?Sized> {
    store: Arc<D>,
    writer: ConcurrencyRetryWriter<D>,
    clock: Arc<dyn Clock>,
}

impl<D: DocumentStore + ?Sized> DocumentSettings<D> {
    pub fn new(store: Arc<D>, clock: Arc<dyn Clock>, retry: RetryPolicy) -> Self {
        let writer = ConcurrencyRetryWriter::new(Arc::clone(&store), Arc::clone(&clock), retry);
        Self { store, writer, clock }
    }
}

#[async_trait]
impl<D: DocumentStore + ?Sized + 'static> VehicleSettingsWriter for DocumentSettings<D> {
    async fn upsert(
        &self,
        registration: &str,
        settings: &VehicleSettings,
    ) -> Result<Vehicle, AppError> {
        let patch = SettingsPatch::resolve(settings)?;
        let registration = registration_key(registration)?;

        // Los documentos nunca se eliminan físicamente: si existe ahora, existirá al escribir
        let exists = self.store.read_vehicle(&registration).await?.is_some();
        let call_sign = match (exists, patch.call_sign()) {
            (_, Some(call_sign)) => call_sign.to_string(),
            (true, None) => String::new(),
            (false, None) => return Err(missing_call_sign(&registration)),
        };
        let now = self.clock.now();

        let document = self
            .writer
            .write_vehicle(&registration, |existing| {
                let mut document = existing.unwrap_or_else(|| {
                    VehicleDocument::new(Vehicle::new(&registration, &call_sign, now))
                });
                patch.apply(&mut document.vehicle);
                document
            })
            .await?;

        info!("✅ Ajustes aplicados a {}", registration);
        Ok(document.vehicle)
    }

    async fn soft_delete(&self, registration: &str) -> Result<Vehicle, AppError> {
        let registration = registration_key(registration)?;
        let current = self
            .store
            .read_vehicle(&registration)
            .await?
            .filter(|d| d.vehicle.is_active())
            .ok_or_else(|| not_found_error("Vehicle", &registration))?;
        let now = self.clock.now();

        let document = self
            .writer
            .write_vehicle(&registration, |existing| {
                let mut document = existing.unwrap_or_else(|| current.clone());
                document.vehicle.deleted_at = Some(now);
                document
            })
            .await?;

        info!("🗑️ Vehículo {} dado de baja lógica", registration);
        Ok(document.vehicle)
    }
}
