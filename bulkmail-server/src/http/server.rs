//! Axum server setup
//!
//! Server skeleton with:
//! - Public health and tracking routes, everything else behind a bearer token
//! - CORS allow-list with credentials
//! - Tracing middleware
//! - Graceful shutdown on SIGTERM/Ctrl+C

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, HeaderValue, Method};
use axum::{middleware, Router};
use sqlx::PgPool;
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use super::{auth, routes};
use crate::config::{ConfigError, ServerConfig};
use crate::dispatch::{PgLedger, SendLedger};
use crate::mail::{SmtpTransportFactory, TransportFactory};
use crate::mx::{HickoryMx, MxResolver};
use crate::upload::{AssetStore, CloudinaryClient};

/// Shared application state
pub struct AppState {
    pub pool: PgPool,
    pub config: ServerConfig,
    /// Storage seen by the dispatcher
    pub ledger: Arc<dyn SendLedger>,
    pub transports: Arc<dyn TransportFactory>,
    pub mx: Arc<dyn MxResolver>,
    /// Outbound HTTP (attachment downloads)
    pub http: reqwest::Client,
    /// CDN client; `None` when no credentials are configured
    pub uploader: Option<Arc<dyn AssetStore>>,
}

impl AppState {
    /// State wired to the real SMTP, DNS and CDN backends.
    pub fn new(pool: PgPool, config: ServerConfig) -> Self {
        let http = reqwest::Client::new();
        let uploader = config.cloudinary.clone().map(|cloudinary| {
            Arc::new(CloudinaryClient::new(cloudinary, http.clone())) as Arc<dyn AssetStore>
        });

        Self {
            ledger: Arc::new(PgLedger::new(pool.clone())),
            pool,
            config,
            transports: Arc::new(SmtpTransportFactory),
            mx: Arc::new(HickoryMx::new()),
            http,
            uploader,
        }
    }
}

fn cors_layer(origins: &[String]) -> Result<CorsLayer, ConfigError> {
    let origins = origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin).map_err(|_| ConfigError::InvalidOrigin(origin.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]))
}

/// Assemble every route with auth, CORS and tracing.
pub fn build_router(state: Arc<AppState>) -> Result<Router, ConfigError> {
    let cors = cors_layer(&state.config.cors_origins)?;

    let protected = Router::new()
        .merge(routes::lists::router())
        .merge(routes::contacts::router())
        .merge(routes::sends::router())
        .merge(routes::users::router())
        .merge(routes::upload::router())
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            auth::require_bearer,
        ));

    Ok(Router::new()
        .merge(routes::health::router())
        .merge(routes::tracking::router())
        .merge(protected)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

/// Run the HTTP server.
///
/// # Example
///
/// ```ignore
/// let pool = create_pool(&database_url).await?;
/// run_server(pool, config).await?;
/// ```
pub async fn run_server(pool: PgPool, config: ServerConfig) -> Result<(), ServerError> {
    config.validate()?;

    let bind_addr = config.bind_addr;
    if config.cloudinary.is_none() {
        tracing::warn!("Cloudinary credentials not set; uploads will be refused");
    }
    tracing::info!(origins = ?config.cors_origins, "CORS allow-list loaded");

    let app = build_router(Arc::new(AppState::new(pool, config)))?;

    // Bind listener
    let listener = TcpListener::bind(bind_addr).await?;
    tracing::info!("Server listening on {}", bind_addr);

    // Run with graceful shutdown
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting shutdown");
        }
    }
}

/// Server error type
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}
