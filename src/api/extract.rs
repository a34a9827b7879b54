//! Request extractors shared by the route handlers

use axum::{
    async_trait,
    extract::{FromRequestParts, Path},
    http::{header, request::Parts, HeaderValue, StatusCode},
    response::IntoResponse,
};

use crate::api::error::ApiError;

/// Numeric resource id from the route's single path parameter
///
/// An id that does not parse as an integer is a validation failure (422),
/// not a routing failure.
#[derive(Debug, Clone, Copy)]
pub struct IdPath(pub i64);

#[async_trait]
impl<S> FromRequestParts<S> for IdPath
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(id) = Path::<i64>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::Validation(format!("Invalid id format: {}", e.body_text())))?;
        Ok(IdPath(id))
    }
}

/// Guard for JSON-returning endpoints: rejects an `Accept` header that
/// excludes `application/json`. A missing header accepts anything.
#[derive(Debug, Clone, Copy)]
pub struct AcceptsJson;

#[async_trait]
impl<S> FromRequestParts<S> for AcceptsJson
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let mut values = parts.headers.get_all(header::ACCEPT).iter().peekable();
        if values.peek().is_none() || values.any(accepts_json) {
            return Ok(AcceptsJson);
        }
        Err(ApiError::NotAcceptable(
            "Only application/json responses are available".into(),
        ))
    }
}

fn accepts_json(value: &HeaderValue) -> bool {
    let Ok(value) = value.to_str() else {
        return false;
    };
    value.split(',').any(|range| {
        let media = range.split(';').next().unwrap_or("").trim();
        media.eq_ignore_ascii_case("application/json")
            || media.eq_ignore_ascii_case("application/*")
            || media == "*/*"
    })
}

/// 204 response to `OPTIONS` listing the methods a route serves
pub fn allow(methods: &'static str) -> impl IntoResponse {
    (StatusCode::NO_CONTENT, [(header::ALLOW, methods)])
}
