//! Server configuration
//!
//! Values are assembled by the binary from CLI flags and environment
//! variables (see `bulkmail serve --help`); this module only holds the
//! resulting settings, their defaults and validation.

use std::net::SocketAddr;
use std::time::Duration;

/// Origins allowed by CORS when none are configured
pub const DEFAULT_CORS_ORIGINS: [&str; 2] = ["http://localhost:5173", "http://127.0.0.1:5173"];

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("API token must not be empty")]
    MissingApiToken,

    #[error("invalid CORS origin '{0}'")]
    InvalidOrigin(String),

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },
}

/// Send-dispatch limits
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Maximum recipients assigned to one sender account
    pub max_per_sender: usize,
    /// Recipients per batch
    pub batch_size: usize,
    /// Pause between consecutive batches of the same sender
    pub batch_delay: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            max_per_sender: 400,
            batch_size: 50,
            batch_delay: Duration::from_secs(2),
        }
    }
}

/// MX validation limits
#[derive(Debug, Clone)]
pub struct MxSettings {
    /// Lookups in flight at once
    pub concurrency: usize,
    /// Per-domain lookup timeout
    pub lookup_timeout: Duration,
}

impl Default for MxSettings {
    fn default() -> Self {
        Self {
            concurrency: 10,
            lookup_timeout: Duration::from_millis(1500),
        }
    }
}

/// Cloudinary credentials for the upload endpoint
#[derive(Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    /// Destination folder for uploaded assets
    pub folder: String,
}

impl std::fmt::Debug for CloudinaryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudinaryConfig")
            .field("cloud_name", &self.cloud_name)
            .field("api_key", &self.api_key)
            .field("folder", &self.folder)
            .finish_non_exhaustive()
    }
}

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Address to bind to (default: 127.0.0.1:3000)
    pub bind_addr: SocketAddr,

    /// Bearer token required on every protected route
    pub api_token: String,

    /// Allowed CORS origins
    pub cors_origins: Vec<String>,

    /// Public base URL used to build tracking-pixel links
    pub tracking_base_url: String,

    /// Image CDN credentials; uploads are refused when absent
    pub cloudinary: Option<CloudinaryConfig>,

    pub dispatch: DispatchSettings,
    pub mx: MxSettings,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            api_token: String::new(),
            cors_origins: DEFAULT_CORS_ORIGINS.iter().map(|o| o.to_string()).collect(),
            tracking_base_url: "http://localhost:3000".to_string(),
            cloudinary: None,
            dispatch: DispatchSettings::default(),
            mx: MxSettings::default(),
        }
    }
}

impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConfig")
            .field("bind_addr", &self.bind_addr)
            .field("cors_origins", &self.cors_origins)
            .field("tracking_base_url", &self.tracking_base_url)
            .field("cloudinary", &self.cloudinary)
            .field("dispatch", &self.dispatch)
            .field("mx", &self.mx)
            .finish_non_exhaustive()
    }
}

impl ServerConfig {
    /// Check settings that would otherwise fail at request time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_token.trim().is_empty() {
            return Err(ConfigError::MissingApiToken);
        }

        for origin in &self.cors_origins {
            if axum::http::HeaderValue::from_str(origin).is_err() {
                return Err(ConfigError::InvalidOrigin(origin.clone()));
            }
        }

        if self.dispatch.max_per_sender == 0 {
            return Err(ConfigError::Zero {
                field: "max_per_sender",
            });
        }
        if self.dispatch.batch_size == 0 {
            return Err(ConfigError::Zero { field: "batch_size" });
        }
        if self.mx.concurrency == 0 {
            return Err(ConfigError::Zero {
                field: "mx concurrency",
            });
        }

        Ok(())
    }
}
