//! Utilidades de validación
//!
//! Este módulo contiene funciones helper para validación de datos
//! y normalización de claves de negocio (matrícula, indicativo).

use chrono::{Datelike, NaiveDate};
use validator::ValidationError;

/// Normalizar una clave de vehículo (matrícula o indicativo)
///
/// Elimina espacios en los extremos, pasa a mayúsculas y quita cualquier
/// espacio interior: `" ab12 cde "` -> `"AB12CDE"`.
pub fn normalize_key(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

/// Normalizar un campo opcional: vacío o solo espacios se convierte en `None`
pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Validar que un string no esté vacío
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut error = ValidationError::new("not_blank");
        error.add_param("value".into(), &value.to_string());
        return Err(error);
    }
    Ok(())
}

/// Años admitidos en fechas recibidas como texto
const YEAR_RANGE: std::ops::RangeInclusive<i32> = 1..=9999;

/// Validar y convertir string a fecha
///
/// Solo se aceptan años de cuatro cifras (0001-9999).
pub fn validate_date(value: &str) -> Result<NaiveDate, ValidationError> {
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        let mut error = ValidationError::new("date");
        error.add_param("value".into(), &value.to_string());
        error.add_param("format".into(), &"YYYY-MM-DD".to_string());
        error
    })?;

    if !YEAR_RANGE.contains(&date.year()) {
        let mut error = ValidationError::new("date_range");
        error.add_param("value".into(), &value.to_string());
        return Err(error);
    }
    Ok(date)
}

/// Validar que una fecha no sea anterior a otra
pub fn validate_not_before(
    value: NaiveDate,
    lower_bound: NaiveDate,
    code: &'static str,
) -> Result<(), ValidationError> {
    if value < lower_bound {
        let mut error = ValidationError::new(code);
        error.add_param("value".into(), &value.to_string());
        error.add_param("min".into(), &lower_bound.to_string());
        return Err(error);
    }
    Ok(())
}
