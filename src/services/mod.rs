//! Services module
//!
//! Este módulo contiene la lógica de negocio: reconciliación de lotes de
//! incidentes (transaccional y documental), agregación de disponibilidad,
//! ajustes de vehículos y la fachada que los reúne.

pub mod availability;
pub mod document_reconciler;
pub mod fleet_service;
pub mod ingest;
pub mod merge;
pub mod reconciler;
pub mod retry_writer;
pub mod settings;

pub use availability::{bucket_by_month, daily_series, AvailabilityAggregator, WINDOW_DAYS};
pub use document_reconciler::{DocumentIngestConfig, DocumentReconciler};
pub use fleet_service::FleetService;
pub use ingest::IncidentIngestor;
pub use reconciler::Reconciler;
pub use retry_writer::{ConcurrencyRetryWriter, RetryPolicy};
pub use settings::{DocumentSettings, SettingsPatch, TransactionalSettings, VehicleSettingsWriter};
