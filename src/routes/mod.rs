//! Rutas HTTP
//!
//! Adaptadores axum sobre la fachada de la flota.

pub mod conditional;
pub mod incident_routes;
pub mod statistics_routes;
pub mod vehicle_routes;

use axum::{extract::State, response::Json, routing::get, Router};
use serde_json::json;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};

use crate::middleware::cors_middleware;
use crate::state::AppState;

/// Router completo de la API
pub fn create_router(state: AppState) -> Router {
    let cors = cors_middleware(&state.config.cors_origins);

    Router::new()
        .route("/health", get(health))
        .nest("/api/incidents", incident_routes::create_incident_router())
        .nest("/api/vehicles", vehicle_routes::create_vehicle_router())
        .nest("/api/statistics", statistics_routes::create_statistics_router())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "service": "fleet-status",
        "status": "healthy",
        "environment": state.config.environment,
        "today": state.fleet.today().to_string(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
