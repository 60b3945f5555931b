//! Send endpoints: dispatch and reports

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::db::{SendDetail, SendOverview, SendRepo, SendSummary};
use crate::dispatch::{DispatchReport, DispatchRequest, Dispatcher};
use crate::http::error::ApiError;
use crate::http::extractors::ValidId;
use crate::http::server::AppState;

const DEFAULT_RECENT: i64 = 12;
const MAX_RECENT: i64 = 100;

#[derive(Deserialize)]
pub struct RecentParams {
    pub limit: Option<i64>,
}

/// POST /sends - dispatch a campaign to a list
///
/// The dispatch runs on its own task so a client disconnect does not stop
/// delivery; the handler only waits for the report. Batches pause between
/// each other, so large lists keep the connection open for minutes.
async fn dispatch(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DispatchRequest>,
) -> Result<Json<DispatchReport>, ApiError> {
    let task = tokio::spawn(async move {
        Dispatcher::new(
            state.ledger.as_ref(),
            state.transports.as_ref(),
            &state.http,
            &state.config.dispatch,
            &state.config.tracking_base_url,
        )
        .dispatch(req)
        .await
    });

    let report = task.await.map_err(|e| ApiError::Internal {
        message: format!("dispatch task failed: {e}"),
    })??;
    Ok(Json(report))
}

/// GET /sends?limit=N - most recent sends with open rates
async fn recent(
    State(state): State<Arc<AppState>>,
    Query(params): Query<RecentParams>,
) -> Result<Json<Vec<SendSummary>>, ApiError> {
    let limit = params.limit.unwrap_or(DEFAULT_RECENT).clamp(1, MAX_RECENT);
    let sends = SendRepo::new(&state.pool).recent(limit).await?;
    Ok(Json(sends))
}

/// GET /sends/stats - totals over completed sends
async fn stats(State(state): State<Arc<AppState>>) -> Result<Json<SendOverview>, ApiError> {
    let overview = SendRepo::new(&state.pool).overview().await?;
    Ok(Json(overview))
}

/// GET /sends/{id} - one send with its recipients
async fn detail(
    State(state): State<Arc<AppState>>,
    ValidId(send_id): ValidId,
) -> Result<Json<SendDetail>, ApiError> {
    let detail = SendRepo::new(&state.pool).detail(send_id).await?;
    Ok(Json(detail))
}

/// Send routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sends", get(recent).post(dispatch))
        .route("/sends/stats", get(stats))
        .route("/sends/{id}", get(detail))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use crate::db::{SendStatus, UserRecord};
    use crate::dispatch::MemoryLedger;
    use crate::http::server::{
        build_router,
        tests::{body_json, test_state, TOKEN},
    };
    use crate::mail::MockTransportFactory;

    use super::*;

    fn post_send(body: &str) -> Request<Body> {
        Request::post("/sends")
            .header("authorization", format!("Bearer {TOKEN}"))
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn sender() -> UserRecord {
        UserRecord {
            id: 5,
            username: "ana".into(),
            password_hash: "hash".into(),
            smtp_email: Some("ana@example.com".into()),
            smtp_password: Some("app-password".into()),
            smtp_server: "smtp.example.com".into(),
            smtp_port: 587,
            smtp_tls: true,
        }
    }

    #[tokio::test]
    async fn dispatch_through_router() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.add_list(1, &["a@example.com", "b@example.com"]);
        ledger.add_user(sender());
        let transports = MockTransportFactory::new();

        let state = test_state(ledger.clone(), transports.clone());
        let app = build_router(Arc::new(state)).unwrap();

        let response = app
            .oneshot(post_send(
                r#"{"subject": "Hola", "body": "<p>hola</p>", "list_id": 1, "sender_ids": [5]}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["sent"], 2);
        assert_eq!(body["batches"], 1);
        assert_eq!(body["sender_ids"], serde_json::json!([5]));

        assert_eq!(transports.delivered().len(), 2);
        assert_eq!(ledger.sends()[0].status, SendStatus::Completed);
    }

    #[tokio::test]
    async fn dispatch_without_senders_is_400() {
        let response = crate::http::server::tests::test_router()
            .oneshot(post_send(r#"{"subject": "Hola", "body": "x", "list_id": 1}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn failed_verify_is_500_with_details() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.add_list(1, &["a@example.com"]);
        ledger.add_user(sender());
        let transports = MockTransportFactory::new();
        transports.refuse_account("ana@example.com");

        let app = build_router(Arc::new(test_state(ledger.clone(), transports))).unwrap();
        let response = app
            .oneshot(post_send(r#"{"subject": "s", "body": "b", "list_id": 1, "sender_id": 5}"#))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], "send_failed");
        assert!(body["details"].as_str().unwrap().contains("authentication failed"));
        assert_eq!(ledger.sends()[0].status, SendStatus::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn dispatch_survives_client_disconnect() {
        let ledger = Arc::new(MemoryLedger::new());
        let emails: Vec<String> = (0..150).map(|i| format!("reader{i:03}@example.com")).collect();
        let emails: Vec<&str> = emails.iter().map(String::as_str).collect();
        ledger.add_list(1, &emails);
        ledger.add_user(sender());
        let transports = MockTransportFactory::new();

        let app = build_router(Arc::new(test_state(ledger.clone(), transports.clone()))).unwrap();

        // The client gives up during the pause after the first batch.
        let dropped = tokio::time::timeout(
            Duration::from_millis(100),
            app.oneshot(post_send(
                r#"{"subject": "s", "body": "b", "list_id": 1, "sender_id": 5}"#,
            )),
        )
        .await;
        assert!(dropped.is_err());
        assert_eq!(ledger.sends()[0].status, SendStatus::Sending);

        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(transports.delivered().len(), 150);
        let send = &ledger.sends()[0];
        assert_eq!(send.status, SendStatus::Completed);
        assert_eq!(send.sent, 150);
    }
}
