use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::Response,
    routing::get,
    Router,
};

use crate::dto::{ApiResponse, StatisticsQuery};
use crate::routes::conditional::{client_has_current, json_with_etag, not_modified};
use crate::state::AppState;
use crate::utils::errors::AppError;

pub fn create_statistics_router() -> Router<AppState> {
    Router::new().route("/availability", get(availability))
}

/// Serie de disponibilidad
///
/// El alcance se valida antes de consultar nada; el ETag se comprueba
/// antes de calcular la serie.
async fn availability(
    State(state): State<AppState>,
    Query(query): Query<StatisticsQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let scope = query.to_filter()?;
    let as_of = query.as_of_date()?;

    let token = state
        .fleet
        .get_statistics_version_token(&scope, as_of, query.resolution)
        .await?;
    if client_has_current(&headers, &token) {
        return Ok(not_modified(&token));
    }

    let series = state
        .fleet
        .get_availability_statistics(&scope, as_of, query.resolution)
        .await?;
    Ok(json_with_etag(&token, ApiResponse::success(series)))
}
