//! HTTP layer
//!
//! Axum server with:
//! - Bearer-token auth on every route but health and tracking
//! - CORS allow-list
//! - Request tracing
//! - Graceful shutdown
//! - JSON error responses

pub mod auth;
pub mod error;
pub mod extractors;
pub mod routes;
pub mod server;

pub use error::ApiError;
pub use server::{build_router, run_server, AppState, ServerError};
