//! Open-tracking pixel
//!
//! Public route: mail clients load it without credentials. The response is
//! always the same 1x1 PNG, whatever happens to the recording.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Path, Request, State},
    http::{header, HeaderMap},
    response::IntoResponse,
    routing::get,
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use once_cell::sync::Lazy;
use uuid::Uuid;

use crate::db::TrackingRepo;
use crate::http::server::AppState;

const PIXEL_BASE64: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mNkYAAAAAYAAjCB0C8AAAAASUVORK5CYII=";

static PIXEL: Lazy<Vec<u8>> = Lazy::new(|| {
    STANDARD
        .decode(PIXEL_BASE64)
        .expect("tracking pixel constant is valid base64")
});

/// First hop of `X-Forwarded-For`, else the peer address.
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
}

fn pixel() -> impl IntoResponse {
    (
        [
            (header::CONTENT_TYPE, "image/png"),
            (header::CACHE_CONTROL, "no-store, no-cache, must-revalidate"),
        ],
        PIXEL.as_slice(),
    )
}

/// GET /track/{token}
async fn track(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    request: Request,
) -> impl IntoResponse {
    let Ok(token) = Uuid::parse_str(&token) else {
        tracing::debug!(%token, "tracking token is not a UUID");
        return pixel();
    };

    let headers = request.headers();
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = client_ip(headers, peer);
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok());

    match TrackingRepo::new(&state.pool)
        .record_open(token, ip.as_deref(), user_agent)
        .await
    {
        Ok(true) => tracing::debug!(%token, "open recorded"),
        Ok(false) => tracing::debug!(%token, "unknown tracking token"),
        Err(e) => tracing::warn!(%token, error = %e, "failed to record open"),
    }

    pixel()
}

/// Tracking routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/track/{token}", get(track))
}
