//! Asset upload endpoint

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    routing::post,
    Json, Router,
};
use serde::Serialize;

use crate::http::error::ApiError;
use crate::http::server::AppState;
use crate::upload::UploadFile;

/// Multipart field carrying the file
const FILE_FIELD: &str = "image";

const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Serialize)]
pub struct UploadResponse {
    /// Public HTTPS URL of the stored asset
    pub location: String,
}

/// POST /upload - store an image or PDF on the CDN
async fn upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut file = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("invalid multipart body: {e}")))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let file_name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::bad_request(format!("failed to read upload: {e}")))?;

        file = Some(UploadFile {
            file_name,
            content_type,
            bytes: bytes.to_vec(),
        });
        break;
    }

    let file = file
        .filter(|f| !f.bytes.is_empty())
        .ok_or_else(|| ApiError::bad_request("no file uploaded"))?;

    let store = state.uploader.as_ref().ok_or_else(|| ApiError::Internal {
        message: "CDN credentials are not configured".to_string(),
    })?;

    let location = store.upload(file).await?;
    Ok(Json(UploadResponse { location }))
}

/// Upload routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/upload", post(upload))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use super::*;
    use crate::dispatch::MemoryLedger;
    use crate::http::server::{
        build_router,
        tests::{body_json, test_state, TOKEN},
    };
    use crate::mail::MockTransportFactory;
    use crate::upload::{AssetStore, ResourceKind, UploadError};

    /// Echoes the resource kind and file name back as a URL
    struct EchoStore;

    #[async_trait]
    impl AssetStore for EchoStore {
        async fn upload(&self, file: UploadFile) -> Result<String, UploadError> {
            let kind = ResourceKind::for_content_type(&file.content_type);
            Ok(format!(
                "https://cdn.example.com/{}/{}",
                kind.as_str(),
                file.file_name
            ))
        }
    }

    fn app(store: Option<Arc<dyn AssetStore>>) -> Router {
        let mut state = test_state(Arc::new(MemoryLedger::new()), MockTransportFactory::new());
        state.uploader = store;
        build_router(Arc::new(state)).unwrap()
    }

    fn multipart(field: &str, file_name: &str, content_type: &str, content: &str) -> Request<Body> {
        let boundary = "XBOUNDARYX";
        let body = format!(
            "--{boundary}\r\n\
             Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n\
             Content-Type: {content_type}\r\n\r\n\
             {content}\r\n\
             --{boundary}--\r\n"
        );

        Request::post("/upload")
            .header("authorization", format!("Bearer {TOKEN}"))
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn pdf_goes_to_raw_storage() {
        let response = app(Some(Arc::new(EchoStore)))
            .oneshot(multipart("image", "flyer.pdf", "application/pdf", "%PDF-1.4"))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await["location"],
            "https://cdn.example.com/raw/flyer.pdf"
        );
    }

    #[tokio::test]
    async fn missing_file_field_is_400() {
        let response = app(Some(Arc::new(EchoStore)))
            .oneshot(multipart("other", "a.png", "image/png", "png-bytes"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unconfigured_cdn_is_500() {
        let response = app(None)
            .oneshot(multipart("image", "a.png", "image/png", "png-bytes"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
