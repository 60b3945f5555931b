//! bulkmail-server: HTTP backend for bulk email campaigns
//!
//! Manages mailing lists, contacts and sender accounts, and dispatches
//! campaigns over SMTP with per-recipient open tracking and bounce records.

pub mod config;
pub mod credentials;
pub mod db;
pub mod dispatch;
pub mod http;
pub mod mail;
pub mod models;
pub mod mx;
pub mod upload;

pub use config::{CloudinaryConfig, DispatchSettings, MxSettings, ServerConfig};
pub use http::{run_server, ApiError};
