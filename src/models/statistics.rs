//! Modelos de estadísticas de disponibilidad

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Resolución de la serie
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    #[default]
    Daily,
    Monthly,
}

/// Un punto de la serie: día (o primer día del mes) y vehículos disponibles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityPoint {
    pub date: NaiveDate,
    pub available: i64,
}

/// Serie de disponibilidad de un alcance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilitySeries {
    pub as_of: NaiveDate,
    pub resolution: Resolution,
    pub total: i64,
    pub off_road: i64,
    pub available: i64,
    pub points: Vec<AvailabilityPoint>,
}
