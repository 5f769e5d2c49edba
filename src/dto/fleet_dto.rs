use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{PlaceFilter, Resolution, Vehicle};
use crate::utils::errors::AppError;
use crate::utils::validation::validate_date;

// Respuesta genérica de la API
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub message: Option<String>,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
        }
    }

    pub fn success_with_message(data: T, message: String) -> Self {
        Self {
            success: true,
            message: Some(message),
            data: Some(data),
        }
    }
}

// Parámetros de alcance (región -> distrito -> base)
#[derive(Debug, Default, Deserialize)]
pub struct ScopeQuery {
    pub region: Option<String>,
    pub district: Option<String>,
    pub hub: Option<String>,
}

impl ScopeQuery {
    pub fn to_filter(&self) -> Result<PlaceFilter, AppError> {
        PlaceFilter::parse(self.region.as_deref(), self.district.as_deref(), self.hub.as_deref())
    }
}

// Parámetros de las estadísticas de disponibilidad
#[derive(Debug, Default, Deserialize)]
pub struct StatisticsQuery {
    pub region: Option<String>,
    pub district: Option<String>,
    pub hub: Option<String>,
    #[serde(default)]
    pub resolution: Resolution,
    pub as_of: Option<String>,
}

impl StatisticsQuery {
    pub fn to_filter(&self) -> Result<PlaceFilter, AppError> {
        PlaceFilter::parse(self.region.as_deref(), self.district.as_deref(), self.hub.as_deref())
    }

    pub fn as_of_date(&self) -> Result<Option<NaiveDate>, AppError> {
        match self.as_of.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(raw) => validate_date(raw).map(Some).map_err(|_| {
                AppError::InvalidInput(format!(
                    "as_of '{}' must be a YYYY-MM-DD date between years 0001 and 9999",
                    raw
                ))
            }),
        }
    }
}

// Response de vehículo
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VehicleResponse {
    pub id: Uuid,
    pub registration: String,
    pub call_sign: String,
    pub body_type: Option<String>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub region: Option<String>,
    pub district: Option<String>,
    pub hub: Option<String>,
    pub is_off_road: bool,
    pub is_for_disposal: bool,
    pub last_modified: DateTime<Utc>,
    pub version_token: String,
}

impl From<Vehicle> for VehicleResponse {
    fn from(vehicle: Vehicle) -> Self {
        Self {
            id: vehicle.id,
            registration: vehicle.registration,
            call_sign: vehicle.call_sign,
            body_type: vehicle.body_type,
            make: vehicle.make,
            model: vehicle.model,
            region: vehicle.region,
            district: vehicle.district,
            hub: vehicle.hub,
            is_off_road: vehicle.is_off_road,
            is_for_disposal: vehicle.is_for_disposal,
            last_modified: vehicle.last_modified,
            version_token: vehicle.version_token,
        }
    }
}
