//! Modelos del sistema
//!
//! Este módulo contiene los modelos de datos de la flota: vehículos,
//! incidentes, reportes de entrada, lugares y estadísticas.

pub mod document;
pub mod incident;
pub mod place;
pub mod report;
pub mod statistics;
pub mod vehicle;

pub use document::{ConditionalWrite, VehicleDocument};
pub use incident::Incident;
pub use place::{PlaceFilter, Region};
pub use report::{IncidentReport, ReconcileSummary, VehicleWriteFailure};
pub use statistics::{AvailabilityPoint, AvailabilitySeries, Resolution};
pub use vehicle::{Vehicle, VehicleSettings};
