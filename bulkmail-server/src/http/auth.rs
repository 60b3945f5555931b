//! Bearer-token middleware

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{header::AUTHORIZATION, Method};
use axum::middleware::Next;
use axum::response::Response;

use super::error::ApiError;
use super::server::AppState;
use crate::credentials::token_matches;

/// Reject requests without `Authorization: Bearer <API_TOKEN>`.
///
/// Preflight requests pass untouched.
pub async fn require_bearer(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if request.method() == Method::OPTIONS {
        return Ok(next.run(request).await);
    }

    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized {
            reason: "missing token",
        })?;

    if !token_matches(token, &state.config.api_token) {
        tracing::warn!(uri = %request.uri(), "rejected request with invalid token");
        return Err(ApiError::Forbidden {
            reason: "invalid token",
        });
    }

    Ok(next.run(request).await)
}
