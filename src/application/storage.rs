//! Object storage port used for markdown bodies and pasted images.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object `{path}` not found in bucket `{bucket}`")]
    Missing { bucket: String, path: String },
    #[error("object `{path}` already exists in bucket `{bucket}`")]
    Conflict { bucket: String, path: String },
    #[error("invalid object path `{0}`")]
    InvalidPath(String),
    #[error("object store request failed: {0}")]
    Transport(String),
    #[error("object store rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn is_missing(&self) -> bool {
        matches!(self, StorageError::Missing { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::Conflict { .. })
    }
}

/// A bucketed blob store.
///
/// Paths are relative keys inside a bucket (`slug/en.md`, `1714560000000-ab12c.png`).
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, bucket: &str, path: &str) -> Result<Bytes, StorageError>;

    /// Create a new object. Never overwrites: an existing key yields
    /// [`StorageError::Conflict`].
    async fn put(
        &self,
        bucket: &str,
        path: &str,
        content_type: &str,
        data: Bytes,
    ) -> Result<(), StorageError>;

    /// Removing an absent object is not an error.
    async fn delete(&self, bucket: &str, path: &str) -> Result<(), StorageError>;

    /// URL a browser can use to fetch the object.
    fn public_url(&self, bucket: &str, path: &str) -> String;
}

/// Reject absolute paths and parent-directory segments before they reach a backend.
pub fn validate_object_path(path: &str) -> Result<&str, StorageError> {
    let trimmed = path.trim_start_matches('/');
    let invalid = trimmed.is_empty()
        || path.starts_with('/')
        || trimmed
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..")
        || trimmed.contains('\\');
    if invalid {
        return Err(StorageError::InvalidPath(path.to_string()));
    }
    Ok(trimmed)
}
