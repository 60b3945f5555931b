//! Custom Axum extractors

use axum::extract::{FromRequestParts, Path};
use axum::http::request::Parts;

use super::error::ApiError;
use crate::models::ValidationError;

fn parse_id(raw: &str, field: &'static str) -> Result<i64, ApiError> {
    raw.parse::<i64>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| {
            ApiError::Validation(ValidationError::InvalidId {
                field,
                value: raw.to_string(),
            })
        })
}

/// Extract and validate a numeric id from a single-segment path
pub struct ValidId(pub i64);

impl<S> FromRequestParts<S> for ValidId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(id): Path<String> = Path::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;

        Ok(Self(parse_id(&id, "id")?))
    }
}

/// Extract `(list_id, contact_id)` from a membership path
pub struct MembershipPath {
    pub list_id: i64,
    pub contact_id: i64,
}

impl<S> FromRequestParts<S> for MembershipPath
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path((list_id, contact_id)): Path<(String, String)> =
            Path::from_request_parts(parts, state)
                .await
                .map_err(|e| ApiError::bad_request(e.body_text()))?;

        Ok(Self {
            list_id: parse_id(&list_id, "list_id")?,
            contact_id: parse_id(&contact_id, "contact_id")?,
        })
    }
}
