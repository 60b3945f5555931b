//! HTTP server command
//!
//! Every flag falls back to an environment variable, so a `.env` file is
//! enough to run the server.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use bulkmail_server::config::DEFAULT_CORS_ORIGINS;
use bulkmail_server::db::{create_pool, migrations};
use bulkmail_server::{run_server, CloudinaryConfig, DispatchSettings, ServerConfig};

/// Arguments for the serve command
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Address to bind to
    #[arg(long, short = 'b', env = "BULKMAIL_BIND", default_value = "127.0.0.1:3000")]
    pub bind: SocketAddr,

    /// Postgres connection URL
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: String,

    /// Bearer token required on every protected route
    #[arg(long, env = "API_TOKEN", hide_env_values = true)]
    pub api_token: String,

    /// Allowed CORS origins, comma-separated
    #[arg(long, env = "CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Vec<String>,

    /// Public base URL used in tracking-pixel links
    #[arg(long, env = "TRACKING_BASE_URL", default_value = "http://localhost:3000")]
    pub tracking_base_url: String,

    /// Cloudinary cloud name (uploads are refused without CDN credentials)
    #[arg(long, env = "CLOUDINARY_CLOUD_NAME")]
    pub cloudinary_cloud_name: Option<String>,

    /// Cloudinary API key
    #[arg(long, env = "CLOUDINARY_API_KEY", hide_env_values = true)]
    pub cloudinary_api_key: Option<String>,

    /// Cloudinary API secret
    #[arg(long, env = "CLOUDINARY_API_SECRET", hide_env_values = true)]
    pub cloudinary_api_secret: Option<String>,

    /// CDN folder for uploaded assets
    #[arg(long, env = "UPLOAD_FOLDER", default_value = "bulkmail")]
    pub upload_folder: String,

    /// Pause between batches of the same sender, in milliseconds
    #[arg(long, env = "BATCH_DELAY_MS", default_value_t = 2000)]
    pub batch_delay_ms: u64,

    /// Do not create or update the schema on startup
    #[arg(long)]
    pub skip_migrations: bool,
}

impl ServeArgs {
    /// Server settings from the parsed flags.
    pub fn server_config(&self) -> ServerConfig {
        let cors_origins: Vec<String> = self
            .cors_origins
            .iter()
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        let cloudinary = match (
            &self.cloudinary_cloud_name,
            &self.cloudinary_api_key,
            &self.cloudinary_api_secret,
        ) {
            (Some(cloud_name), Some(api_key), Some(api_secret)) => Some(CloudinaryConfig {
                cloud_name: cloud_name.clone(),
                api_key: api_key.clone(),
                api_secret: api_secret.clone(),
                folder: self.upload_folder.clone(),
            }),
            (None, None, None) => None,
            _ => {
                tracing::warn!("incomplete Cloudinary credentials; uploads disabled");
                None
            }
        };

        ServerConfig {
            bind_addr: self.bind,
            api_token: self.api_token.clone(),
            cors_origins: if cors_origins.is_empty() {
                DEFAULT_CORS_ORIGINS.iter().map(|o| o.to_string()).collect()
            } else {
                cors_origins
            },
            tracking_base_url: self.tracking_base_url.trim_end_matches('/').to_string(),
            cloudinary,
            dispatch: DispatchSettings {
                batch_delay: Duration::from_millis(self.batch_delay_ms),
                ..DispatchSettings::default()
            },
            ..ServerConfig::default()
        }
    }
}

/// Run the HTTP server
pub async fn run_serve(args: ServeArgs) -> Result<()> {
    let config = args.server_config();
    config.validate().context("Invalid server configuration")?;

    tracing::info!("Starting bulkmail server on {}", config.bind_addr);

    // Create database pool
    let pool = create_pool(&args.database_url)
        .await
        .context("Failed to create database pool")?;

    if !args.skip_migrations {
        migrations::run(&pool)
            .await
            .context("Failed to apply schema")?;
    }

    // Run server (blocks until shutdown)
    run_server(pool, config).await.context("Server error")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> ServeArgs {
        let mut argv = vec!["serve", "--database-url", "postgres://x", "--api-token", "t"];
        argv.extend_from_slice(args);
        ServeArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults_apply() {
        let config = parse(&[]).server_config();
        assert_eq!(config.bind_addr.port(), 3000);
        assert_eq!(config.cors_origins.len(), 2);
        assert_eq!(config.tracking_base_url, "http://localhost:3000");
        assert!(config.cloudinary.is_none());
        assert_eq!(config.dispatch.batch_delay, Duration::from_secs(2));
    }

    #[test]
    fn origins_split_on_commas() {
        let config = parse(&["--cors-origins", "https://a.example, https://b.example"])
            .server_config();
        assert_eq!(config.cors_origins, ["https://a.example", "https://b.example"]);
    }

    #[test]
    fn cloudinary_needs_all_three() {
        let partial = parse(&["--cloudinary-cloud-name", "demo"]).server_config();
        assert!(partial.cloudinary.is_none());

        let full = parse(&[
            "--cloudinary-cloud-name",
            "demo",
            "--cloudinary-api-key",
            "k",
            "--cloudinary-api-secret",
            "s",
            "--upload-folder",
            "campaigns",
        ])
        .server_config();
        assert_eq!(full.cloudinary.unwrap().folder, "campaigns");
    }

    #[test]
    fn batch_delay_is_configurable() {
        let config = parse(&["--batch-delay-ms", "250"]).server_config();
        assert_eq!(config.dispatch.batch_delay, Duration::from_millis(250));
    }
}
