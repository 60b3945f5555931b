//! Asset upload to the Cloudinary CDN
//!
//! Campaign images and PDFs are stored on the CDN so messages can link to
//! them. Requests are signed with SHA-256 over the sorted parameters
//! followed by the API secret.

use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::config::CloudinaryConfig;

const API_BASE: &str = "https://api.cloudinary.com/v1_1";

/// File received from a client
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Cloudinary resource type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Image,
    /// Stored verbatim; used for PDFs
    Raw,
}

impl ResourceKind {
    pub fn for_content_type(content_type: &str) -> Self {
        if content_type.eq_ignore_ascii_case("application/pdf") {
            Self::Raw
        } else {
            Self::Image
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Raw => "raw",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("upload request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("CDN rejected upload ({status}): {message}")]
    Rejected { status: u16, message: String },
}

/// Storage for uploaded assets (testable)
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Store the file and return its public HTTPS URL.
    async fn upload(&self, file: UploadFile) -> Result<String, UploadError>;
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: String,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Signed uploads through the Cloudinary REST API
pub struct CloudinaryClient {
    config: CloudinaryConfig,
    http: reqwest::Client,
}

impl CloudinaryClient {
    pub fn new(config: CloudinaryConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }

    fn endpoint(&self, kind: ResourceKind) -> String {
        format!(
            "{API_BASE}/{}/{}/upload",
            self.config.cloud_name,
            kind.as_str()
        )
    }
}

/// Hex SHA-256 of `k1=v1&k2=v2...` (sorted by key) followed by the secret.
pub fn sign(params: &[(&str, &str)], api_secret: &str) -> String {
    let mut sorted = params.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let to_sign = sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

#[async_trait]
impl AssetStore for CloudinaryClient {
    async fn upload(&self, file: UploadFile) -> Result<String, UploadError> {
        let kind = ResourceKind::for_content_type(&file.content_type);
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default()
            .to_string();

        let signature = sign(
            &[
                ("folder", self.config.folder.as_str()),
                ("timestamp", timestamp.as_str()),
            ],
            &self.config.api_secret,
        );

        debug!(
            file = %file.file_name,
            bytes = file.bytes.len(),
            resource = kind.as_str(),
            "uploading asset"
        );

        let part = Part::bytes(file.bytes)
            .file_name(file.file_name.clone())
            .mime_str(&file.content_type)?;

        let form = Form::new()
            .part("file", part)
            .text("api_key", self.config.api_key.clone())
            .text("folder", self.config.folder.clone())
            .text("timestamp", timestamp)
            .text("signature_algorithm", "sha256")
            .text("signature", signature);

        let response = self
            .http
            .post(self.endpoint(kind))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(UploadError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let uploaded: UploadResponse = response.json().await?;
        info!(file = %file.file_name, url = %uploaded.secure_url, "asset uploaded");
        Ok(uploaded.secure_url)
    }
}
