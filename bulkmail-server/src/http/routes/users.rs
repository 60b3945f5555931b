//! User (sender account) endpoints
//!
//! Responses carry `UserProfile`, never the password hash or SMTP password.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Deserializer, Serialize};

use crate::credentials;
use crate::db::{NewUser, SmtpSettings, UserProfile, UserRepo, UserUpdate};
use crate::http::error::ApiError;
use crate::http::extractors::ValidId;
use crate::http::server::AppState;
use crate::models::{SmtpPort, Username};

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Serialize)]
pub struct LoginResponse {
    pub ok: bool,
    pub user: UserProfile,
}

/// Create and update share one shape; every field is optional on the wire.
/// On update an explicit `null` (or blank) SMTP email or password clears it.
#[derive(Deserialize, Default)]
pub struct UserRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    pub smtp_email: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    pub smtp_password: Option<Option<String>>,
    pub smtp_server: Option<String>,
    pub smtp_port: Option<i32>,
    pub smtp_tls: Option<bool>,
}

#[derive(Deserialize)]
pub struct SmtpConfigRequest {
    pub smtp_email: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_server: Option<String>,
    pub smtp_port: Option<i32>,
    pub smtp_tls: Option<bool>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Absent field is `None`, `null` is `Some(None)`.
fn nullable<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

fn port(value: Option<i32>) -> Result<Option<i32>, ApiError> {
    Ok(value.map(SmtpPort::new).transpose()?.map(SmtpPort::get))
}

/// Hash on the blocking pool.
async fn hash(password: String) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || credentials::hash_password(&password))
        .await
        .map_err(|e| ApiError::Internal {
            message: format!("hashing task failed: {e}"),
        })?
        .map_err(|e| ApiError::Internal {
            message: format!("password hashing failed: {e}"),
        })
}

/// POST /users/login
async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let (Some(username), Some(password)) = (non_empty(req.username), non_empty(req.password))
    else {
        return Err(ApiError::bad_request("username and password are required"));
    };

    let user = UserRepo::new(&state.pool)
        .find_by_username(username.trim())
        .await?
        .ok_or(ApiError::InvalidCredentials)?;

    let hash = user.password_hash.clone();
    let verified = tokio::task::spawn_blocking(move || credentials::verify_password(&password, &hash))
        .await
        .map_err(|e| ApiError::Internal {
            message: format!("verification task failed: {e}"),
        })?;

    if !verified {
        tracing::info!(username = %user.username, "login refused");
        return Err(ApiError::InvalidCredentials);
    }

    Ok(Json(LoginResponse {
        ok: true,
        user: user.profile(),
    }))
}

/// GET /users
async fn list_users(State(state): State<Arc<AppState>>) -> Result<Json<Vec<UserProfile>>, ApiError> {
    let users = UserRepo::new(&state.pool).list().await?;
    Ok(Json(users))
}

/// GET /users/{id}
async fn get_user(
    State(state): State<Arc<AppState>>,
    ValidId(id): ValidId,
) -> Result<Json<UserProfile>, ApiError> {
    let user = UserRepo::new(&state.pool).get(id).await?;
    Ok(Json(user))
}

/// POST /users - create a user with optional SMTP settings
async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UserRequest>,
) -> Result<(StatusCode, Json<UserProfile>), ApiError> {
    let (Some(username), Some(password)) = (non_empty(req.username), non_empty(req.password))
    else {
        return Err(ApiError::bad_request("username and password are required"));
    };
    let username = Username::new(&username)?;

    let defaults = SmtpSettings::default();
    let smtp = SmtpSettings {
        email: non_empty(req.smtp_email.flatten()),
        password: non_empty(req.smtp_password.flatten()),
        server: non_empty(req.smtp_server).unwrap_or(defaults.server),
        port: port(req.smtp_port)?.unwrap_or(defaults.port),
        tls: req.smtp_tls.unwrap_or(defaults.tls),
    };

    let user = UserRepo::new(&state.pool)
        .create(NewUser {
            username,
            password_hash: hash(password).await?,
            smtp,
        })
        .await?;

    tracing::info!(user_id = user.id, username = %user.username, "user created");
    Ok((StatusCode::CREATED, Json(user)))
}

/// PUT /users/{id} - username required, other fields only when present
async fn update_user(
    State(state): State<Arc<AppState>>,
    ValidId(id): ValidId,
    Json(req): Json<UserRequest>,
) -> Result<Json<UserProfile>, ApiError> {
    let username = non_empty(req.username)
        .ok_or_else(|| ApiError::bad_request("username is required"))?;
    let username = Username::new(&username)?;
    let smtp_port = port(req.smtp_port)?;

    let password_hash = match non_empty(req.password) {
        Some(password) => Some(hash(password).await?),
        None => None,
    };

    let user = UserRepo::new(&state.pool)
        .update(
            id,
            UserUpdate {
                username,
                password_hash,
                smtp_email: req.smtp_email.map(non_empty),
                smtp_password: req.smtp_password.map(non_empty),
                smtp_server: non_empty(req.smtp_server),
                smtp_port,
                smtp_tls: req.smtp_tls,
            },
        )
        .await?;

    Ok(Json(user))
}

/// PUT /users/{id}/smtp-config - replace SMTP settings
async fn update_smtp_config(
    State(state): State<Arc<AppState>>,
    ValidId(id): ValidId,
    Json(req): Json<SmtpConfigRequest>,
) -> Result<Json<UserProfile>, ApiError> {
    let (Some(email), Some(password)) = (non_empty(req.smtp_email), non_empty(req.smtp_password))
    else {
        return Err(ApiError::bad_request(
            "smtp_email and smtp_password are required",
        ));
    };

    let defaults = SmtpSettings::default();
    let smtp = SmtpSettings {
        email: Some(email),
        password: Some(password),
        server: non_empty(req.smtp_server).unwrap_or(defaults.server),
        port: port(req.smtp_port)?.unwrap_or(defaults.port),
        tls: req.smtp_tls.unwrap_or(defaults.tls),
    };

    let user = UserRepo::new(&state.pool).update_smtp(id, smtp).await?;
    Ok(Json(user))
}

/// DELETE /users/{id}
async fn delete_user(
    State(state): State<Arc<AppState>>,
    ValidId(id): ValidId,
) -> Result<StatusCode, ApiError> {
    UserRepo::new(&state.pool).delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// User routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users/login", post(login))
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/{id}",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route("/users/{id}/smtp-config", put(update_smtp_config))
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
    async fn login_requires_both_fields() {
        let response = test_router()
            .oneshot(authed("POST", "/users/login", r#"{"username": "ana"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn create_requires_password() {
        let response = test_router()
            .oneshot(authed("POST", "/users", r#"{"username": "ana", "password": ""}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn update_requires_username() {
        let response = test_router()
            .oneshot(authed("PUT", "/users/3", r#"{"smtp_port": 465}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn smtp_config_requires_credentials() {
        let response = test_router()
            .oneshot(authed(
                "PUT",
                "/users/3/smtp-config",
                r#"{"smtp_email": "ana@example.com"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn out_of_range_port_is_400() {
        for (method, uri, body) in [
            ("POST", "/users", r#"{"username": "ana", "password": "pw", "smtp_port": 70000}"#),
            ("PUT", "/users/3", r#"{"username": "ana", "smtp_port": 0}"#),
            (
                "PUT",
                "/users/3/smtp-config",
                r#"{"smtp_email": "ana@example.com", "smtp_password": "pw", "smtp_port": 65536}"#,
            ),
        ] {
            let response = test_router().oneshot(authed(method, uri, body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{method} {uri}");
            let body = body_json(response).await;
            assert!(body["message"].as_str().unwrap().contains("smtp_port"));
        }
    }

    #[test]
    fn null_is_distinct_from_absent() {
        let absent: UserRequest = serde_json::from_str(r#"{"username": "ana"}"#).unwrap();
        assert_eq!(absent.smtp_email, None);

        let cleared: UserRequest =
            serde_json::from_str(r#"{"username": "ana", "smtp_email": null, "smtp_password": null}"#)
                .unwrap();
        assert_eq!(cleared.smtp_email, Some(None));
        assert_eq!(cleared.smtp_password.map(non_empty), Some(None));

        let set: UserRequest =
            serde_json::from_str(r#"{"smtp_email": "ana@example.com", "smtp_password": " "}"#)
                .unwrap();
        assert_eq!(set.smtp_email, Some(Some("ana@example.com".into())));
        assert_eq!(set.smtp_password.map(non_empty), Some(None));
    }

    #[test]
    fn blank_values_count_as_missing() {
        assert_eq!(non_empty(Some("  ".into())), None);
        assert_eq!(non_empty(Some("x".into())), Some("x".into()));
        assert_eq!(non_empty(None), None);
    }
}
