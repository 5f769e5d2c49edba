//! Reportes de incidentes
//!
//! Entrada de la ingesta (no se persiste tal cual) y resumen del resultado
//! de reconciliar un lote.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::utils::validation::{non_blank, normalize_key, validate_not_before, validate_not_blank};

/// Una fila del fichero de incidentes, ya tipada
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_report_dates"))]
pub struct IncidentReport {
    #[validate(custom = "validate_not_blank")]
    pub registration: String,
    #[validate(custom = "validate_not_blank")]
    pub call_sign: String,
    #[serde(default)]
    pub body_type: Option<String>,
    #[serde(default)]
    pub make: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    pub start_date: NaiveDate,
    /// Fecha "a día de" del fichero que contiene el reporte
    pub report_date: NaiveDate,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub comments: String,
    #[serde(default)]
    pub estimated_repair_date: Option<NaiveDate>,
}

fn validate_report_dates(report: &IncidentReport) -> Result<(), ValidationError> {
    validate_not_before(report.report_date, report.start_date, "report_before_start")
}

impl IncidentReport {
    pub fn new(
        registration: &str,
        call_sign: &str,
        start_date: NaiveDate,
        report_date: NaiveDate,
    ) -> Self {
        Self {
            registration: registration.to_string(),
            call_sign: call_sign.to_string(),
            body_type: None,
            make: None,
            model: None,
            start_date,
            report_date,
            description: String::new(),
            comments: String::new(),
            estimated_repair_date: None,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_comments(mut self, comments: &str) -> Self {
        self.comments = comments.to_string();
        self
    }

    pub fn with_estimated_repair(mut self, date: NaiveDate) -> Self {
        self.estimated_repair_date = Some(date);
        self
    }

    /// Claves normalizadas y atributos vacíos convertidos en `None`
    pub fn normalized(self) -> Self {
        Self {
            registration: normalize_key(&self.registration),
            call_sign: normalize_key(&self.call_sign),
            body_type: non_blank(self.body_type),
            make: non_blank(self.make),
            model: non_blank(self.model),
            description: self.description.trim().to_string(),
            comments: self.comments.trim().to_string(),
            ..self
        }
    }
}

/// Vehículo que no pudo escribirse (variante documental)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VehicleWriteFailure {
    pub registration: String,
    pub error: String,
}

/// Resultado de reconciliar un lote
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileSummary {
    pub batch_date: Option<NaiveDate>,
    pub authoritative: bool,
    pub reports: usize,
    /// Vehículos cuyo indicador "fuera de servicio" se limpió en bloque
    pub vehicles_cleared: usize,
    pub vehicles_created: usize,
    pub vehicles_updated: usize,
    pub vehicles_restored: usize,
    pub incidents_created: usize,
    pub incidents_updated: usize,
    /// La limpieza en bloque falló en algún tramo (variante documental)
    pub clear_failed: bool,
    pub failures: Vec<VehicleWriteFailure>,
    /// El marcador no pudo avanzarse tras aplicar el lote (variante documental)
    pub marker_error: Option<String>,
}

impl ReconcileSummary {
    pub fn is_complete(&self) -> bool {
        !self.clear_failed && self.failures.is_empty() && self.marker_error.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[test]
    fn test_report_validation() {
        assert!(IncidentReport::new("AB12CDE", "WR1", d(1), d(2)).validate().is_ok());
        assert!(IncidentReport::new(" ", "WR1", d(1), d(2)).validate().is_err());
        assert!(IncidentReport::new("AB12CDE", "", d(1), d(2)).validate().is_err());
        assert!(IncidentReport::new("AB12CDE", "WR1", d(3), d(2)).validate().is_err());
    }

    #[test]
    fn test_report_normalization() {
        let mut report = IncidentReport::new(" ab12 cde ", "wr 1", d(1), d(2));
        report.make = Some("  ".to_string());
        report.model = Some(" Sprinter ".to_string());

        let report = report.normalized();
        assert_eq!(report.registration, "AB12CDE");
        assert_eq!(report.call_sign, "WR1");
        assert_eq!(report.make, None);
        assert_eq!(report.model, Some("Sprinter".to_string()));
    }

    #[test]
    fn test_report_deserializes_with_defaults() {
        let report: IncidentReport = serde_json::from_str(
            r#"{"registration":"AB12CDE","call_sign":"WR1","start_date":"2024-01-01","report_date":"2024-01-02"}"#,
        )
        .unwrap();
        assert_eq!(report.description, "");
        assert_eq!(report.estimated_repair_date, None);
    }
}
