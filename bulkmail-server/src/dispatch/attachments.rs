//! Attachment download

use reqwest::header::CONTENT_TYPE;
use serde::Deserialize;
use tracing::debug;

use crate::mail::MailAttachment;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
const FALLBACK_FILE_NAME: &str = "attachment";

/// Attachment reference as sent by clients: a bare URL or `{url, name}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum AttachmentSource {
    Url(String),
    Named { url: String, name: Option<String> },
}

impl AttachmentSource {
    pub fn url(&self) -> &str {
        match self {
            Self::Url(url) | Self::Named { url, .. } => url,
        }
    }

    /// Given name, else the last URL path segment.
    pub fn file_name(&self) -> String {
        match self {
            Self::Named {
                name: Some(name), ..
            } if !name.trim().is_empty() => name.trim().to_string(),
            _ => file_name_from_url(self.url()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("failed to download attachment {url}: {source}")]
pub struct AttachmentError {
    pub url: String,
    #[source]
    pub source: reqwest::Error,
}

/// Last path segment of `url` without query string or fragment.
pub fn file_name_from_url(url: &str) -> String {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    path.rsplit('/')
        .find(|segment| !segment.is_empty())
        .filter(|segment| !segment.contains(':'))
        .map(str::to_string)
        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string())
}

/// Download every attachment, in order.
pub async fn fetch_all(
    client: &reqwest::Client,
    sources: &[AttachmentSource],
) -> Result<Vec<MailAttachment>, AttachmentError> {
    let mut attachments = Vec::with_capacity(sources.len());

    for source in sources {
        let url = source.url();
        let wrap = |e: reqwest::Error| AttachmentError {
            url: url.to_string(),
            source: e,
        };

        let response = client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(wrap)?;

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();
        let content = response.bytes().await.map_err(wrap)?.to_vec();

        debug!(url, bytes = content.len(), %content_type, "attachment downloaded");

        attachments.push(MailAttachment {
            filename: source.file_name(),
            content_type,
            content,
        });
    }

    Ok(attachments)
}
