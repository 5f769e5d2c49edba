//! Reconciliador transaccional
//!
//! Aplica un lote de reportes dentro de una única transacción: limpieza de
//! indicadores, altas, fusión de incidentes y avance del marcador. O se
//! confirma todo o no se confirma nada.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::cache::VersionToken;
use crate::models::{IncidentReport, ReconcileSummary, Vehicle};
use crate::repositories::{FleetStore, FleetTransaction};
use crate::services::ingest::IncidentIngestor;
use crate::services::merge::{
    apply_report_to_vehicle, batch_date, is_authoritative, merge_incident, prepare_batch,
    vehicle_from_report, IncidentChange,
};
use crate::services::retry_writer::RetryPolicy;
use crate::utils::errors::{ReconcileError, StoreError};
use crate::utils::Clock;

/// Vehículo cargado en la transacción junto al token con el que se leyó
struct TrackedVehicle {
    vehicle: Vehicle,
    read_token: String,
}

pub struct Reconciler<S: ?Sized> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
}

impl<S: FleetStore + ?Sized> Reconciler<S> {
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Reconciliar un lote completo
    ///
    /// Un error transitorio repite la transacción entera; cualquier otro
    /// error la revierte y se propaga.
    pub async fn reconcile(
        &self,
        reports: Vec<IncidentReport>,
    ) -> Result<ReconcileSummary, ReconcileError> {
        if reports.is_empty() {
            info!("📭 Lote vacío, nada que reconciliar");
            return Ok(ReconcileSummary::default());
        }

        let reports = prepare_batch(reports)?;
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.run_once(&reports).await {
                Ok(summary) => return Ok(summary),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    warn!(
                        "⏳ Error transitorio en la reconciliación (intento {}/{}): {}",
                        attempt, max_attempts, e
                    );
                    tokio::time::sleep(self.policy.delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn run_once(&self, reports: &[IncidentReport]) -> Result<ReconcileSummary, StoreError> {
        let now = self.clock.now();
        let mut tx = self.store.begin().await?;

        match apply_batch(tx.as_mut(), reports, now).await {
            Ok(summary) => {
                tx.commit().await?;
                info!(
                    "✅ Lote {:?}: {} reportes, {} vehículos nuevos, {} incidentes nuevos, {} ampliados (autoritativo: {})",
                    summary.batch_date,
                    summary.reports,
                    summary.vehicles_created,
                    summary.incidents_created,
                    summary.incidents_updated,
                    summary.authoritative
                );
                Ok(summary)
            }
            Err(e) => {
                error!("❌ Reconciliación fallida, revirtiendo: {}", e);
                if let Err(rollback_error) = tx.rollback().await {
                    warn!("⚠️ Error al revertir la transacción: {}", rollback_error);
                }
                Err(e)
            }
        }
    }
}

async fn apply_batch(
    tx: &mut dyn FleetTransaction,
    reports: &[IncidentReport],
    now: DateTime<Utc>,
) -> Result<ReconcileSummary, StoreError> {
    let Some(batch_date) = batch_date(reports) else {
        return Ok(ReconcileSummary::default());
    };

    let marker = tx.resync_marker().await?;
    let authoritative = is_authoritative(reports, batch_date, marker);
    let mut summary = ReconcileSummary {
        batch_date: Some(batch_date),
        authoritative,
        reports: reports.len(),
        ..Default::default()
    };

    if authoritative {
        let cleared = tx.clear_off_road(now).await?;
        let tokens: Vec<(uuid::Uuid, String)> = cleared
            .iter()
            .map(|id| (*id, VersionToken::for_entity(id, now)))
            .collect();
        tx.stamp_version_tokens(&tokens).await?;
        summary.vehicles_cleared = cleared.len();
        info!("🧹 {} vehículo(s) vuelven a estar disponibles", cleared.len());
    } else {
        info!(
            "📎 Lote {} no autoritativo (marcador: {:?}), solo se fusionan incidentes",
            batch_date, marker
        );
    }

    let mut tracked: BTreeMap<String, TrackedVehicle> = BTreeMap::new();

    for report in reports {
        let entry = match tracked.entry(report.registration.clone()) {
            Entry::Occupied(occupied) => occupied.into_mut(),
            Entry::Vacant(vacant) => {
                let vehicle = match tx.find_vehicle_by_registration(&report.registration).await? {
                    Some(existing) => {
                        if existing.is_active() {
                            summary.vehicles_updated += 1;
                        } else {
                            summary.vehicles_restored += 1;
                        }
                        existing
                    }
                    None => {
                        // Alta inmediata: los incidentes necesitan la fila del vehículo
                        let created = vehicle_from_report(report, now);
                        tx.save_vehicle(&created, None).await?;
                        summary.vehicles_created += 1;
                        created
                    }
                };
                vacant.insert(TrackedVehicle {
                    read_token: vehicle.version_token.clone(),
                    vehicle,
                })
            }
        };

        let vehicle_id = entry.vehicle.id;
        let existing = tx.find_incident(vehicle_id, report.start_date).await?;
        let (incident, change) = merge_incident(existing, vehicle_id, report);
        match change {
            IncidentChange::Created => {
                tx.save_incident(&incident).await?;
                summary.incidents_created += 1;
            }
            IncidentChange::Extended => {
                tx.save_incident(&incident).await?;
                summary.incidents_updated += 1;
            }
            IncidentChange::Unchanged => {}
        }

        apply_report_to_vehicle(&mut entry.vehicle, report, authoritative);
    }

    for (_, mut tracked_vehicle) in tracked {
        tracked_vehicle.vehicle.touch(now);
        tx.save_vehicle(&tracked_vehicle.vehicle, Some(&tracked_vehicle.read_token))
            .await?;
    }

    if authoritative {
        tx.set_resync_marker(batch_date).await?;
    }

    Ok(summary)
}

#[async_trait]
impl<S: FleetStore + ?Sized + 'static> IncidentIngestor for Reconciler<S> {
    async fn ingest(
        &self,
        reports: Vec<IncidentReport>,
    ) -> Result<ReconcileSummary, ReconcileError> {
        self.reconcile(reports).await
    }
}
