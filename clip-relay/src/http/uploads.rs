//! Blob upload and download endpoints.

use crate::error::StorageError;
use crate::server::ClipRelay;
use axum::body::Bytes;
use axum::extract::Path;
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use clip_types::DEFAULT_MIME;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Body of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResponse {
    /// Relative URL to put in the clip's `upload_url`.
    pub upload_url: String,
    /// Stored length in bytes.
    pub size: u64,
}

impl IntoResponse for StorageError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::NotFound { .. } | Self::InvalidId { .. } => StatusCode::NOT_FOUND,
            Self::UnsupportedMediaType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = match &self {
            Self::NotFound { .. } | Self::InvalidId { .. } => "not found",
            Self::UnsupportedMediaType { .. } => "unsupported media type",
            Self::Io(_) => "storage error",
        };
        (status, body).into_response()
    }
}

/// `POST /upload`: store the request body as a blob.
///
/// The body size limit is enforced by the route's `DefaultBodyLimit`, which
/// answers 413 before this handler runs.
pub async fn upload_handler(
    Extension(relay): Extension<Arc<ClipRelay>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<UploadResponse>, StorageError> {
    let allowed = &relay.config().uploads.allowed_mimes;
    if !allowed.is_empty() {
        let content_type = media_type(&headers);
        if !mime_allowed(allowed, &content_type) {
            tracing::debug!(mime = %content_type, "Rejected upload content type");
            return Err(StorageError::UnsupportedMediaType { mime: content_type });
        }
    }

    let blob = relay.blobs().store(&body).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to store upload");
        e
    })?;
    tracing::info!(id = %blob.id, size = blob.size, "Upload stored");
    Ok(Json(UploadResponse {
        upload_url: blob.url(),
        size: blob.size,
    }))
}

/// `GET /d/:id`: return a stored blob.
pub async fn download_handler(
    Extension(relay): Extension<Arc<ClipRelay>>,
    Path(id): Path<String>,
) -> Result<Response, StorageError> {
    let bytes = relay.blobs().open(&id).await.map_err(|e| {
        if let StorageError::Io(io) = &e {
            tracing::error!(%id, error = %io, "Failed to read blob");
        }
        e
    })?;
    let disposition = format!("inline; filename={id}");
    Ok((
        [
            (CONTENT_TYPE, DEFAULT_MIME.to_string()),
            (CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

/// The request's media type without parameters, defaulting to octet-stream.
fn media_type(headers: &HeaderMap) -> String {
    let raw = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_MIME);
    raw.split(';').next().unwrap_or(raw).trim().to_ascii_lowercase()
}

/// Whether `content_type` matches an exact entry or a `type/*` wildcard.
///
/// An empty allow list accepts everything. Matching is case-insensitive.
pub fn mime_allowed(allowed: &[String], content_type: &str) -> bool {
    if allowed.is_empty() {
        return true;
    }
    let content_type = content_type.trim().to_ascii_lowercase();
    allowed
        .iter()
        .map(|pattern| pattern.trim().to_ascii_lowercase())
        .filter(|pattern| !pattern.is_empty())
        .any(|pattern| match pattern.strip_suffix("/*") {
            Some(base) => content_type
                .strip_prefix(base)
                .is_some_and(|rest| rest.starts_with('/')),
            None => pattern == content_type,
        })
}
