//! Respuestas condicionales (ETag / If-None-Match)

use axum::{
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::cache::CacheValidator;

/// ¿Alguno de los tokens de `If-None-Match` coincide con el vigente?
pub fn client_has_current(headers: &HeaderMap, current_token: &str) -> bool {
    headers
        .get_all(header::IF_NONE_MATCH)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(CacheValidator::token_from_if_none_match)
        .any(|token| CacheValidator::is_unchanged(token, current_token))
}

pub fn not_modified(token: &str) -> Response {
    (StatusCode::NOT_MODIFIED, [(header::ETAG, CacheValidator::etag(token))]).into_response()
}

pub fn json_with_etag<T: Serialize>(token: &str, body: T) -> Response {
    ([(header::ETAG, CacheValidator::etag(token))], Json(body)).into_response()
}
