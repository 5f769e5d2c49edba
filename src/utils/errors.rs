//! Sistema de manejo de errores
//!
//! Este módulo define los tipos de errores del sistema: errores de
//! almacenamiento, de reconciliación y de escritura concurrente, y su
//! conversión a respuestas HTTP apropiadas.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

/// Errores del almacenamiento (Postgres, Redis o memoria)
#[derive(Error, Debug)]
pub enum StoreError {
    /// Precondición optimista fallida: otro escritor modificó la entidad
    #[error("Write conflict: {0}")]
    Conflict(String),

    /// Fallo de acceso temporal (timeout, conexión caída...), reintentable
    #[error("Transient storage error: {0}")]
    Transient(String),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(error: sqlx::Error) -> Self {
        match &error {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Transient(error.to_string())
            }
            sqlx::Error::Database(db_error) => match db_error.code().as_deref() {
                // unique_violation
                Some("23505") => StoreError::Conflict(db_error.message().to_string()),
                // serialization_failure, deadlock_detected
                Some("40001") | Some("40P01") => {
                    StoreError::Transient(db_error.message().to_string())
                }
                _ => StoreError::Backend(error.to_string()),
            },
            _ => StoreError::Backend(error.to_string()),
        }
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(error: redis::RedisError) -> Self {
        if error.is_io_error()
            || error.is_timeout()
            || error.is_connection_dropped()
            || error.is_connection_refusal()
        {
            StoreError::Transient(error.to_string())
        } else {
            StoreError::Backend(error.to_string())
        }
    }
}

/// Reporte rechazado en la validación previa del lote
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRejection {
    /// Posición del reporte dentro del lote recibido
    pub index: usize,
    pub registration: String,
    pub reason: String,
}

/// Errores de la reconciliación de un lote de incidentes
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Batch rejected: {} invalid report(s)", .0.len())]
    Validation(Vec<ReportRejection>),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Error de escritura de un vehículo tras agotar los reintentos
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("Vehicle {registration}: write conflict persisted after {attempts} attempt(s)")]
    ConflictExhausted { registration: String, attempts: u32 },

    #[error("Vehicle {registration}: storage unavailable after {attempts} attempt(s): {message}")]
    TransientExhausted {
        registration: String,
        attempts: u32,
        message: String,
    },

    #[error("Vehicle {registration}: {source}")]
    Store {
        registration: String,
        #[source]
        source: StoreError,
    },
}

impl WriteError {
    pub fn registration(&self) -> &str {
        match self {
            WriteError::ConflictExhausted { registration, .. }
            | WriteError::TransientExhausted { registration, .. }
            | WriteError::Store { registration, .. } => registration,
        }
    }
}

/// Errores principales de la aplicación (capa HTTP)
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Batch rejected")]
    BatchRejected(Vec<ReportRejection>),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Conflict(msg) => AppError::Conflict(msg),
            StoreError::Transient(msg) => AppError::ServiceUnavailable(msg),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<ReconcileError> for AppError {
    fn from(error: ReconcileError) -> Self {
        match error {
            ReconcileError::Validation(rejections) => AppError::BatchRejected(rejections),
            ReconcileError::Store(e) => e.into(),
        }
    }
}

impl From<WriteError> for AppError {
    fn from(error: WriteError) -> Self {
        match error {
            WriteError::ConflictExhausted { .. } => AppError::Conflict(error.to_string()),
            WriteError::TransientExhausted { .. } => {
                AppError::ServiceUnavailable(error.to_string())
            }
            WriteError::Store { source, .. } => source.into(),
        }
    }
}

/// Respuesta de error para la API
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_response) = match self {
            AppError::Validation(e) => {
                tracing::warn!("⚠️ Validation error: {}", e);
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse {
                        error: "Validation Error".to_string(),
                        message: "The provided data is invalid".to_string(),
                        details: Some(json!(e)),
                        code: Some("VALIDATION_ERROR".to_string()),
                    },
                )
            }

            AppError::InvalidInput(msg) => {
                tracing::warn!("⚠️ Invalid input: {}", msg);
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse {
                        error: "Validation Error".to_string(),
                        message: msg,
                        details: None,
                        code: Some("VALIDATION_ERROR".to_string()),
                    },
                )
            }

            AppError::BatchRejected(rejections) => {
                tracing::warn!(
                    "⚠️ Lote rechazado: {} reporte(s) inválido(s)",
                    rejections.len()
                );
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse {
                        error: "Validation Error".to_string(),
                        message: "The incident batch contains invalid reports".to_string(),
                        details: Some(json!({ "rejected": rejections })),
                        code: Some("BATCH_REJECTED".to_string()),
                    },
                )
            }

            AppError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                ErrorResponse {
                    error: "Not Found".to_string(),
                    message: msg,
                    details: None,
                    code: Some("NOT_FOUND".to_string()),
                },
            ),

            AppError::Conflict(msg) => {
                tracing::warn!("⚠️ Conflict: {}", msg);
                (
                    StatusCode::CONFLICT,
                    ErrorResponse {
                        error: "Conflict".to_string(),
                        message: msg,
                        details: None,
                        code: Some("CONFLICT".to_string()),
                    },
                )
            }

            AppError::ServiceUnavailable(msg) => {
                tracing::error!("❌ Service unavailable: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    ErrorResponse {
                        error: "Service Unavailable".to_string(),
                        message: msg,
                        details: None,
                        code: Some("SERVICE_UNAVAILABLE".to_string()),
                    },
                )
            }

            AppError::Internal(msg) => {
                tracing::error!("❌ Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse {
                        error: "Internal Server Error".to_string(),
                        message: "An unexpected error occurred".to_string(),
                        details: Some(json!({ "internal_error": msg })),
                        code: Some("INTERNAL_ERROR".to_string()),
                    },
                )
            }
        };

        (status, Json(error_response)).into_response()
    }
}

/// Función helper para crear errores de recurso no encontrado
pub fn not_found_error(resource: &str, key: &str) -> AppError {
    AppError::NotFound(format!("{} with key '{}' not found", resource, key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_classification() {
        assert!(StoreError::Conflict("x".into()).is_conflict());
        assert!(StoreError::Transient("x".into()).is_transient());
        assert!(!StoreError::Backend("x".into()).is_transient());

        let pool_timeout: StoreError = sqlx::Error::PoolTimedOut.into();
        assert!(pool_timeout.is_transient());
        let row_not_found: StoreError = sqlx::Error::RowNotFound.into();
        assert!(matches!(row_not_found, StoreError::Backend(_)));
    }

    #[test]
    fn test_app_error_status_codes() {
        let rejected = AppError::from(ReconcileError::Validation(vec![ReportRejection {
            index: 0,
            registration: String::new(),
            reason: "registration is blank".to_string(),
        }]));
        assert_eq!(rejected.into_response().status(), StatusCode::BAD_REQUEST);

        let transient = AppError::from(StoreError::Transient("timeout".into()));
        assert_eq!(transient.into_response().status(), StatusCode::SERVICE_UNAVAILABLE);

        let conflict = AppError::from(WriteError::ConflictExhausted {
            registration: "AB12CDE".to_string(),
            attempts: 3,
        });
        assert_eq!(conflict.into_response().status(), StatusCode::CONFLICT);

        assert_eq!(
            not_found_error("Vehicle", "ZZ99ZZZ").into_response().status(),
            StatusCode::NOT_FOUND
        );
    }
}
