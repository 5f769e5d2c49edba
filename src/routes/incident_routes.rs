use axum::{extract::State, routing::post, Json, Router};
use tower::limit::GlobalConcurrencyLimitLayer;
use tracing::info;

use crate::dto::ApiResponse;
use crate::models::{IncidentReport, ReconcileSummary};
use crate::state::AppState;
use crate::utils::errors::AppError;

/// Los lotes se ingieren de uno en uno por proceso
pub fn create_incident_router() -> Router<AppState> {
    Router::new()
        .route("/batch", post(reconcile_batch))
        .layer(GlobalConcurrencyLimitLayer::new(1))
}

/// Ingerir un fichero de incidentes ya tipado
///
/// Un lote con fallos parciales (variante documental) responde 200 con el
/// detalle de los vehículos no escritos en el resumen.
async fn reconcile_batch(
    State(state): State<AppState>,
    Json(reports): Json<Vec<IncidentReport>>,
) -> Result<Json<ApiResponse<ReconcileSummary>>, AppError> {
    info!("📥 Lote de incidentes recibido: {} reportes", reports.len());
    let summary = state.fleet.reconcile_batch(reports).await?;

    let message = if summary.is_complete() {
        "Batch reconciled".to_string()
    } else {
        format!("Batch reconciled with {} vehicle failure(s)", summary.failures.len())
    };
    Ok(Json(ApiResponse::success_with_message(summary, message)))
}
