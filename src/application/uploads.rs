//! Images pasted into the composer.
//!
//! Uploads are provisional: each one is recorded as pending until a published
//! post references it. Cancelled drafts release their uploads explicitly and a
//! periodic sweep removes anything left unclaimed.

use std::sync::Arc;

use axum::http::StatusCode;
use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::error::HttpError;
use crate::application::repos::{RecordUploadParams, RepoError, UploadsRepo};
use crate::application::storage::{ObjectStore, StorageError, validate_object_path};
use crate::domain::entities::PendingUploadRecord;
use crate::domain::posts::image_markdown;
use crate::domain::slug::unix_millis;

const SOURCE: &str = "application::uploads";
const RANDOM_NAME_LEN: usize = 10;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("only image uploads are accepted, got `{0}`")]
    UnsupportedType(String),
    #[error("uploaded file is empty")]
    EmptyPayload,
    #[error("uploaded file exceeds {limit} bytes")]
    TooLarge { limit: u64 },
    #[error("failed to store upload")]
    Storage(#[from] StorageError),
    #[error("failed to record upload")]
    Repo(#[from] RepoError),
}

impl From<UploadError> for HttpError {
    fn from(err: UploadError) -> Self {
        let (status, message) = match &err {
            UploadError::UnsupportedType(_) => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, "Only images can be uploaded")
            }
            UploadError::EmptyPayload => (StatusCode::BAD_REQUEST, "Uploaded file is empty"),
            UploadError::TooLarge { .. } => {
                (StatusCode::PAYLOAD_TOO_LARGE, "Uploaded file is too large")
            }
            UploadError::Storage(_) | UploadError::Repo(_) => {
                (StatusCode::BAD_GATEWAY, "Image upload failed")
            }
        };
        HttpError::from_error(SOURCE, status, message, &err).json()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadedImage {
    pub path: String,
    pub url: String,
    pub markdown: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupSummary {
    pub removed: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct UploadService {
    store: Arc<dyn ObjectStore>,
    uploads: Arc<dyn UploadsRepo>,
    bucket: String,
    max_bytes: u64,
}

impl UploadService {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        uploads: Arc<dyn UploadsRepo>,
        bucket: impl Into<String>,
        max_bytes: u64,
    ) -> Self {
        Self {
            store,
            uploads,
            bucket: bucket.into(),
            max_bytes,
        }
    }

    pub async fn upload_image(
        &self,
        original_name: &str,
        content_type: &str,
        data: Bytes,
        uploaded_by: Option<String>,
    ) -> Result<UploadedImage, UploadError> {
        if !content_type.starts_with("image/") {
            return Err(UploadError::UnsupportedType(content_type.to_string()));
        }
        if data.is_empty() {
            return Err(UploadError::EmptyPayload);
        }
        if data.len() as u64 > self.max_bytes {
            return Err(UploadError::TooLarge {
                limit: self.max_bytes,
            });
        }

        let path = stored_name(original_name, content_type, OffsetDateTime::now_utc());
        self.store
            .put(&self.bucket, &path, content_type, data)
            .await?;
        let url = self.store.public_url(&self.bucket, &path);

        let recorded = self
            .uploads
            .record_pending(RecordUploadParams {
                path: path.clone(),
                public_url: url.clone(),
                uploaded_by,
            })
            .await;
        if let Err(err) = recorded {
            self.delete_best_effort(&path).await;
            return Err(err.into());
        }

        Ok(UploadedImage {
            markdown: image_markdown(&url),
            path,
            url,
        })
    }

    /// Delete uploads from a cancelled draft. Claimed or unknown paths are left alone.
    pub async fn discard(&self, paths: &[String]) -> CleanupSummary {
        let candidates: Vec<String> = paths
            .iter()
            .filter(|path| validate_object_path(path).is_ok())
            .cloned()
            .collect();
        if candidates.is_empty() {
            return CleanupSummary::default();
        }

        let released = match self.uploads.release_unclaimed(&candidates).await {
            Ok(released) => released,
            Err(err) => {
                warn!(target = "folio::uploads", error = %err, "failed to release uploads");
                metrics::counter!("folio_upload_cleanup_failures_total")
                    .increment(candidates.len() as u64);
                return CleanupSummary {
                    removed: 0,
                    failed: candidates.len(),
                };
            }
        };

        self.remove_objects(released).await
    }

    /// Delete uploads that no published post claimed within `older_than`.
    pub async fn sweep(&self, older_than: Duration) -> Result<CleanupSummary, UploadError> {
        let cutoff = OffsetDateTime::now_utc() - older_than;
        let stale = self.uploads.list_unclaimed_before(cutoff).await?;
        let paths: Vec<String> = stale.into_iter().map(|upload| upload.path).collect();
        if paths.is_empty() {
            return Ok(CleanupSummary::default());
        }

        let released = self.uploads.release_unclaimed(&paths).await?;
        let summary = self.remove_objects(released).await;
        info!(
            target = "folio::uploads",
            removed = summary.removed,
            failed = summary.failed,
            "swept orphaned uploads"
        );
        Ok(summary)
    }

    async fn remove_objects(&self, released: Vec<PendingUploadRecord>) -> CleanupSummary {
        let mut summary = CleanupSummary::default();
        for upload in released {
            match self.store.delete(&self.bucket, &upload.path).await {
                Ok(()) => summary.removed += 1,
                Err(err) => {
                    summary.failed += 1;
                    metrics::counter!("folio_upload_cleanup_failures_total").increment(1);
                    warn!(
                        target = "folio::uploads",
                        path = %upload.path,
                        error = %err,
                        "failed to delete upload; keeping it pending for the next sweep"
                    );
                    if let Err(err) = self.uploads.restore_pending(&upload).await {
                        warn!(target = "folio::uploads", path = %upload.path, error = %err, "failed to re-record upload");
                    }
                }
            }
        }
        summary
    }

    async fn delete_best_effort(&self, path: &str) {
        if let Err(err) = self.store.delete(&self.bucket, path).await {
            metrics::counter!("folio_upload_cleanup_failures_total").increment(1);
            warn!(target = "folio::uploads", path = %path, error = %err, "failed to delete upload");
        }
    }
}

/// `<unix-millis>-<random>.<ext>` with the extension taken from the file name or MIME type.
fn stored_name(original_name: &str, content_type: &str, now: OffsetDateTime) -> String {
    let from_name = std::path::Path::new(original_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()));
    let extension = from_name
        .or_else(|| {
            mime_guess::get_mime_extensions_str(content_type)
                .and_then(|exts| exts.first())
                .map(|ext| ext.to_string())
        })
        .unwrap_or_else(|| "bin".to_string());

    let random = Uuid::new_v4().simple().to_string();
    format!(
        "{}-{}.{extension}",
        unix_millis(now),
        &random[..RANDOM_NAME_LEN]
    )
}
