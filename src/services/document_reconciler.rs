//! Reconciliador documental
//!
//! Variante sin transacciones entre documentos: la limpieza de indicadores
//! se hace en tramos atómicos con pausa entre ellos, y cada vehículo se
//! escribe por separado con reintentos por concurrencia. Los fallos por
//! vehículo se acumulan en el resumen y no detienen el lote.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use crate::models::{ConditionalWrite, IncidentReport, ReconcileSummary, VehicleWriteFailure};
use crate::repositories::DocumentStore;
use crate::services::ingest::IncidentIngestor;
use crate::services::merge::{
    apply_reports_to_document, batch_date, group_by_vehicle, is_authoritative, prepare_batch,
    DocumentOutcome, VehicleReports,
};
use crate::services::retry_writer::{ConcurrencyRetryWriter, RetryPolicy};
use crate::utils::errors::{ReconcileError, WriteError};
use crate::utils::Clock;

/// Parámetros de la ingesta documental
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentIngestConfig {
    /// Documentos por escritura atómica durante la limpieza
    pub chunk_size: usize,
    /// Pausa entre tramos
    pub chunk_delay: Duration,
    /// Vehículos escritos en paralelo
    pub write_concurrency: usize,
    pub retry: RetryPolicy,
}

impl Default for DocumentIngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: 25,
            chunk_delay: Duration::from_millis(100),
            write_concurrency: 10,
            retry: RetryPolicy::default(),
        }
    }
}

/// Resultado de la limpieza en bloque
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct ClearOutcome {
    cleared: usize,
    failed_chunks: usize,
}

pub struct DocumentReconciler<D: ?Sized> {
    store: Arc<D>,
    writer: ConcurrencyRetryWriter<D>,
    clock: Arc<dyn Clock>,
    config: DocumentIngestConfig,
}

impl<D: DocumentStore + ?Sized> DocumentReconciler<D> {
    pub fn new(store: Arc<D>, clock: Arc<dyn Clock>, config: DocumentIngestConfig) -> Self {
        let writer =
            ConcurrencyRetryWriter::new(Arc::clone(&store), Arc::clone(&clock), config.retry);
        Self {
            store,
            writer,
            clock,
            config,
        }
    }

    pub async fn reconcile(
        &self,
        reports: Vec<IncidentReport>,
    ) -> Result<ReconcileSummary, ReconcileError> {
        if reports.is_empty() {
            info!("📭 Lote vacío, nada que reconciliar");
            return Ok(ReconcileSummary::default());
        }

        let reports = prepare_batch(reports)?;
        let Some(batch_date) = batch_date(&reports) else {
            return Ok(ReconcileSummary::default());
        };

        let now = self.clock.now();
        let marker = self
            .config
            .retry
            .retry_transient("leer marcador", || self.store.resync_marker())
            .await?;
        let authoritative = is_authoritative(&reports, batch_date, marker);
        let mut summary = ReconcileSummary {
            batch_date: Some(batch_date),
            authoritative,
            reports: reports.len(),
            ..Default::default()
        };

        if authoritative {
            let outcome = self.clear_off_road(now).await;
            summary.vehicles_cleared = outcome.cleared;
            summary.clear_failed = outcome.failed_chunks > 0;
        }

        // Vehículos distintos no compiten entre sí: se escriben en paralelo por tramos
        let groups: Vec<(&str, VehicleReports<'_>)> =
            group_by_vehicle(&reports).into_iter().collect();
        for chunk in groups.chunks(self.config.write_concurrency.max(1)) {
            let writes = chunk.iter().map(|(registration, group)| {
                self.write_group(registration, group, authoritative, now)
            });
            let results = futures::future::join_all(writes).await;

            for result in results {
                match result {
                    Ok(outcome) => {
                        if outcome.created {
                            summary.vehicles_created += 1;
                        } else if outcome.restored {
                            summary.vehicles_restored += 1;
                        } else {
                            summary.vehicles_updated += 1;
                        }
                        summary.incidents_created += outcome.incidents_created;
                        summary.incidents_updated += outcome.incidents_updated;
                    }
                    Err(e) => {
                        warn!(
                            "⚠️ No se pudo escribir el vehículo {}: {}",
                            e.registration(),
                            e
                        );
                        summary.failures.push(VehicleWriteFailure {
                            registration: e.registration().to_string(),
                            error: e.to_string(),
                        });
                    }
                }
            }
        }

        // El marcador avanza aunque haya fallos parciales
        if authoritative {
            let advanced = self
                .config
                .retry
                .retry_transient("avanzar marcador", || {
                    self.store.advance_resync_marker(batch_date)
                })
                .await;
            match advanced {
                Ok(false) if marker != Some(batch_date) => warn!(
                    "⚠️ Otro lote posterior ya avanzó el marcador; {} no lo retrocede",
                    batch_date
                ),
                Ok(_) => {}
                Err(e) => {
                    error!("❌ No se pudo avanzar el marcador a {}: {}", batch_date, e);
                    summary.marker_error = Some(e.to_string());
                }
            }
        }

        if summary.is_complete() {
            info!(
                "✅ Lote {} reconciliado: {} reportes, {} vehículos nuevos, {} incidentes nuevos",
                batch_date, summary.reports, summary.vehicles_created, summary.incidents_created
            );
        } else {
            warn!(
                "⚠️ Lote {} con {} fallo(s) de vehículo (limpieza fallida: {}, marcador: {})",
                batch_date,
                summary.failures.len(),
                summary.clear_failed,
                summary.marker_error.as_deref().unwrap_or("ok")
            );
        }

        Ok(summary)
    }

    async fn write_group(
        &self,
        registration: &str,
        group: &VehicleReports<'_>,
        authoritative: bool,
        now: DateTime<Utc>,
    ) -> Result<DocumentOutcome, WriteError> {
        let mut outcome = DocumentOutcome::default();
        self.writer
            .write_vehicle(registration, |existing| {
                let (document, attempt_outcome) =
                    apply_reports_to_document(existing, group, authoritative, now);
                outcome = attempt_outcome;
                document
            })
            .await?;
        Ok(outcome)
    }

    /// Limpiar el indicador "fuera de servicio" de toda la flota por tramos
    async fn clear_off_road(&self, now: DateTime<Utc>) -> ClearOutcome {
        let documents = match self.store.list_documents().await {
            Ok(documents) => documents,
            Err(e) => {
                error!("❌ No se pudo listar la flota para la limpieza: {}", e);
                return ClearOutcome {
                    cleared: 0,
                    failed_chunks: 1,
                };
            }
        };

        let writes: Vec<ConditionalWrite> = documents
            .into_iter()
            .filter(|d| d.vehicle.is_active() && d.vehicle.is_off_road)
            .map(|mut document| {
                let expected_token = Some(document.version_token().to_string());
                document.vehicle.is_off_road = false;
                document.vehicle.touch(now);
                ConditionalWrite {
                    document,
                    expected_token,
                }
            })
            .collect();

        let mut outcome = ClearOutcome::default();
        for (index, chunk) in writes.chunks(self.config.chunk_size.max(1)).enumerate() {
            if index > 0 {
                tokio::time::sleep(self.config.chunk_delay).await;
            }
            match self.store.write_batch(chunk).await {
                Ok(()) => outcome.cleared += chunk.len(),
                Err(e) => {
                    warn!(
                        "⚠️ Tramo {} de limpieza fallido ({} vehículos): {}",
                        index,
                        chunk.len(),
                        e
                    );
                    outcome.failed_chunks += 1;
                }
            }
        }

        info!(
            "🧹 Limpieza por tramos: {} vehículo(s) disponibles, {} tramo(s) fallidos",
            outcome.cleared, outcome.failed_chunks
        );
        outcome
    }
}

#[async_trait]
impl<D: DocumentStore + ?Sized + 'static> IncidentIngestor for DocumentReconciler<D> {
    async fn ingest(
        &self,
        reports: Vec<IncidentReport>,
    ) -> Result<ReconcileSummary, ReconcileError> {
        self.reconcile(reports).await
    }
}
