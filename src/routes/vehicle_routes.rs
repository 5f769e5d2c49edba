use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    response::Response,
    routing::{get, put},
    Json, Router,
};
use tracing::info;

use crate::dto::{ApiResponse, ScopeQuery, VehicleResponse};
use crate::models::VehicleSettings;
use crate::routes::conditional::{client_has_current, json_with_etag, not_modified};
use crate::state::AppState;
use crate::utils::errors::{not_found_error, AppError};

pub fn create_vehicle_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_vehicles))
        .route("/:key", get(get_vehicle).delete(delete_vehicle))
        .route("/:key/settings", put(update_settings))
}

/// Flota activa de un alcance; ETag = token del alcance
async fn list_vehicles(
    State(state): State<AppState>,
    Query(query): Query<ScopeQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let scope = query.to_filter()?;
    let token = state.fleet.get_scope_version_token(&scope, None).await?;
    if client_has_current(&headers, &token) {
        return Ok(not_modified(&token));
    }

    let vehicles: Vec<VehicleResponse> = state
        .fleet
        .vehicles_in_scope(&scope)
        .await?
        .into_iter()
        .map(VehicleResponse::from)
        .collect();
    Ok(json_with_etag(&token, ApiResponse::success(vehicles)))
}

/// Vehículo por matrícula o indicativo; ETag = token del vehículo
async fn get_vehicle(
    State(state): State<AppState>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let vehicle = state
        .fleet
        .get_vehicle_by_key(&key)
        .await?
        .ok_or_else(|| not_found_error("Vehicle", &key))?;

    let token = vehicle.version_token.clone();
    if client_has_current(&headers, &token) {
        return Ok(not_modified(&token));
    }
    Ok(json_with_etag(&token, ApiResponse::success(VehicleResponse::from(vehicle))))
}

async fn update_settings(
    State(state): State<AppState>,
    Path(registration): Path<String>,
    Json(settings): Json<VehicleSettings>,
) -> Result<Response, AppError> {
    let vehicle = state.fleet.upsert_vehicle_settings(&registration, &settings).await?;
    info!("🔧 Ajustes guardados para {}", vehicle.registration);

    let token = vehicle.version_token.clone();
    Ok(json_with_etag(
        &token,
        ApiResponse::success_with_message(
            VehicleResponse::from(vehicle),
            "Vehicle settings saved".to_string(),
        ),
    ))
}

async fn delete_vehicle(
    State(state): State<AppState>,
    Path(registration): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let vehicle = state.fleet.delete_vehicle(&registration).await?;
    Ok(Json(serde_json::json!({
        "success": true,
        "message": format!("Vehicle {} deleted", vehicle.registration)
    })))
}
