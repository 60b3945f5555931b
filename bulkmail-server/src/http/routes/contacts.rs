//! Contact endpoints

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};

use crate::db::{Contact, ContactRepo};
use crate::http::error::ApiError;
use crate::http::server::AppState;

/// GET /contacts - every contact across lists
async fn list_contacts(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Contact>>, ApiError> {
    let contacts = ContactRepo::new(&state.pool).list_all().await?;
    Ok(Json(contacts))
}

/// Contact routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/contacts", get(list_contacts))
}
