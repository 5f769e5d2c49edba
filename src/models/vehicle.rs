//! Modelo de Vehicle
//!
//! Este módulo contiene el struct Vehicle y los ajustes editables.
//! Mapea exactamente a la tabla `vehicles` (clave primaria `id`, índice
//! único sobre la matrícula normalizada).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::cache::VersionToken;
use crate::utils::validation::{normalize_key, validate_not_blank};

/// Vehicle principal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Vehicle {
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
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Vehicle {
    /// Crear un vehículo nuevo a partir de su matrícula e indicativo
    pub fn new(registration: &str, call_sign: &str, now: DateTime<Utc>) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            registration: normalize_key(registration),
            call_sign: normalize_key(call_sign),
            body_type: None,
            make: None,
            model: None,
            region: None,
            district: None,
            hub: None,
            is_off_road: false,
            is_for_disposal: false,
            last_modified: now,
            version_token: VersionToken::for_entity(id, now),
            deleted_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// Registrar una mutación: actualiza la fecha y recalcula el token
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_modified = now;
        self.version_token = VersionToken::for_entity(self.id, now);
    }
}

/// Ajustes editables de un vehículo (upsert directo, fuera de la reconciliación)
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate)]
pub struct VehicleSettings {
    #[validate(custom = "validate_not_blank")]
    pub call_sign: Option<String>,
    pub body_type: Option<String>,
    pub make: Option<String>,
    pub model: Option<String>,
    pub region: Option<String>,
    pub district: Option<String>,
    pub hub: Option<String>,
    pub is_for_disposal: Option<bool>,
}
