//! Mailing list endpoints

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::db::{Contact, ImportSummary, ListRepo, MailingList};
use crate::http::error::ApiError;
use crate::http::extractors::{MembershipPath, ValidId};
use crate::http::server::AppState;
use crate::models::{EmailAddress, ListName};
use crate::mx::{self, MxReport};

/// Create list request
#[derive(Deserialize)]
pub struct CreateListRequest {
    #[serde(default)]
    pub name: String,
}

/// Add contact request
#[derive(Deserialize)]
pub struct AddContactRequest {
    #[serde(default)]
    pub email: String,
}

/// Bulk import request
#[derive(Deserialize)]
pub struct ImportRequest {
    pub emails: Option<Vec<String>>,
}

#[derive(Serialize)]
pub struct CountResponse {
    pub count: i64,
}

/// POST /lists - create a list (existing name returns the existing list)
async fn create_list(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateListRequest>,
) -> Result<(StatusCode, Json<MailingList>), ApiError> {
    let name = ListName::new(&req.name)?;
    let list = ListRepo::new(&state.pool).create(name).await?;

    Ok((StatusCode::CREATED, Json(list)))
}

/// GET /lists - all lists ordered by name
async fn list_lists(State(state): State<Arc<AppState>>) -> Result<Json<Vec<MailingList>>, ApiError> {
    let lists = ListRepo::new(&state.pool).list().await?;
    Ok(Json(lists))
}

/// DELETE /lists/{id}
async fn delete_list(
    State(state): State<Arc<AppState>>,
    ValidId(list_id): ValidId,
) -> Result<StatusCode, ApiError> {
    ListRepo::new(&state.pool).delete(list_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// GET /lists/{id}/contacts
async fn list_contacts(
    State(state): State<Arc<AppState>>,
    ValidId(list_id): ValidId,
) -> Result<Json<Vec<Contact>>, ApiError> {
    let contacts = ListRepo::new(&state.pool).contacts(list_id).await?;
    Ok(Json(contacts))
}

/// POST /lists/{id}/contacts - add one address to a list
async fn add_contact(
    State(state): State<Arc<AppState>>,
    ValidId(list_id): ValidId,
    Json(req): Json<AddContactRequest>,
) -> Result<(StatusCode, Json<Contact>), ApiError> {
    let email = EmailAddress::parse(&req.email)?;
    let contact = ListRepo::new(&state.pool).add_contact(list_id, &email).await?;

    Ok((StatusCode::CREATED, Json(contact)))
}

/// GET /lists/{id}/count
async fn count_contacts(
    State(state): State<Arc<AppState>>,
    ValidId(list_id): ValidId,
) -> Result<Json<CountResponse>, ApiError> {
    let count = ListRepo::new(&state.pool).count(list_id).await?;
    Ok(Json(CountResponse { count }))
}

/// DELETE /lists/{id}/contacts/{contact_id} - unlink only
async fn remove_contact(
    State(state): State<Arc<AppState>>,
    path: MembershipPath,
) -> Result<StatusCode, ApiError> {
    ListRepo::new(&state.pool)
        .remove_contact(path.list_id, path.contact_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /lists/{id}/import - bulk import with per-category counters
async fn import_contacts(
    State(state): State<Arc<AppState>>,
    ValidId(list_id): ValidId,
    Json(req): Json<ImportRequest>,
) -> Result<Json<ImportSummary>, ApiError> {
    let emails = req
        .emails
        .filter(|emails| !emails.is_empty())
        .ok_or_else(|| ApiError::bad_request("emails must be a non-empty array"))?;

    let summary = ListRepo::new(&state.pool).import(list_id, &emails).await?;
    Ok(Json(summary))
}

/// GET /lists/{id}/validate - MX check of every address in the list
async fn validate_list(
    State(state): State<Arc<AppState>>,
    ValidId(list_id): ValidId,
) -> Result<Json<MxReport>, ApiError> {
    let emails: Vec<String> = ListRepo::new(&state.pool)
        .contacts(list_id)
        .await?
        .into_iter()
        .map(|contact| contact.email)
        .collect();

    let report = mx::validate(state.mx.as_ref(), &emails, &state.config.mx).await;
    tracing::info!(
        list_id,
        total = report.total,
        invalid = report.invalid,
        "list validated"
    );
    Ok(Json(report))
}

/// List routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/lists", get(list_lists).post(create_list))
        .route("/lists/{id}", delete(delete_list))
        .route("/lists/{id}/contacts", get(list_contacts).post(add_contact))
        .route("/lists/{id}/count", get(count_contacts))
        .route(
            "/lists/{id}/contacts/{contact_id}",
            delete(remove_contact),
        )
        .route("/lists/{id}/import", post(import_contacts))
        .route("/lists/{id}/validate", get(validate_list))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::http::server::tests::{body_json, test_router, TOKEN};

    use super::*;

    fn authed(method: &str, uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("authorization", format!("Bearer {TOKEN}"))
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn import_requires_emails() {
        let response = test_router()
            .oneshot(authed("POST", "/lists/1/import", r#"{"emails": []}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = test_router()
            .oneshot(authed("POST", "/lists/1/import", "{}"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn blank_list_name_is_400() {
        let response = test_router()
            .oneshot(authed("POST", "/lists", r#"{"name": "   "}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"], "validation_error");
    }

    #[tokio::test]
    async fn malformed_contact_email_is_400() {
        let response = test_router()
            .oneshot(authed("POST", "/lists/1/contacts", r#"{"email": "nope"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn non_numeric_id_is_400() {
        let response = test_router()
            .oneshot(authed("GET", "/lists/abc/count", ""))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
