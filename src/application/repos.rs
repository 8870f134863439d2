//! Repository traits describing persistence adapters.

use std::collections::BTreeSet;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::entities::{ContentRecord, PendingUploadRecord, SlugLocale};
use crate::domain::locale::Locale;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    pub fn is_duplicate_slug(&self) -> bool {
        matches!(self, RepoError::Duplicate { constraint } if constraint.contains("slug"))
    }
}

/// Read side of the posts ⋈ translations model.
#[async_trait]
pub trait ContentRepo: Send + Sync {
    /// Every post translated into `locale`, newest publication first.
    async fn list_posts(&self, locale: Locale) -> Result<Vec<ContentRecord>, RepoError>;

    /// Returns [`RepoError::NotFound`] when the slug has no translation in `locale`.
    async fn find_post(&self, slug: &str, locale: Locale) -> Result<ContentRecord, RepoError>;

    /// Raw locale codes stored for a slug. Codes outside the locale table are
    /// filtered by the caller.
    async fn list_locale_codes(&self, slug: &str) -> Result<Vec<String>, RepoError>;

    async fn slug_exists(&self, slug: &str) -> Result<bool, RepoError>;

    /// Lazily stream every (slug, locale) pair in storage order.
    fn stream_slug_locales(&self) -> BoxStream<'_, Result<SlugLocale, RepoError>>;
}

#[derive(Debug, Clone)]
pub struct CreatePostParams {
    pub slug: String,
    pub locale: Locale,
    pub title: String,
    pub description: String,
    pub markdown_path: String,
    pub tags: Vec<String>,
    pub author: Option<String>,
    pub published_at: OffsetDateTime,
}

#[async_trait]
pub trait ContentWriteRepo: Send + Sync {
    /// Insert a post and its first translation in a single transaction.
    async fn create_post(&self, params: CreatePostParams) -> Result<ContentRecord, RepoError>;
}

#[derive(Debug, Clone)]
pub struct RecordUploadParams {
    pub path: String,
    pub public_url: String,
    pub uploaded_by: Option<String>,
}

/// Bookkeeping for images uploaded while composing.
#[async_trait]
pub trait UploadsRepo: Send + Sync {
    async fn record_pending(&self, params: RecordUploadParams) -> Result<(), RepoError>;

    /// Mark every unclaimed upload whose public URL occurs in `body` as claimed.
    /// Returns the number of uploads claimed.
    async fn claim_referenced(&self, body: &str) -> Result<u64, RepoError>;

    /// Drop the bookkeeping rows for the given paths that are still unclaimed,
    /// returning the rows actually released.
    async fn release_unclaimed(
        &self,
        paths: &[String],
    ) -> Result<Vec<PendingUploadRecord>, RepoError>;

    /// Put a released row back unchanged, keeping its original `created_at`.
    async fn restore_pending(&self, record: &PendingUploadRecord) -> Result<(), RepoError>;

    async fn list_unclaimed_before(
        &self,
        cutoff: OffsetDateTime,
    ) -> Result<Vec<PendingUploadRecord>, RepoError>;
}

/// Set of supported locales parsed from stored codes, skipping unknown ones.
pub fn known_locales<I, S>(codes: I) -> (BTreeSet<Locale>, Vec<String>)
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut locales = BTreeSet::new();
    let mut unknown = Vec::new();
    for code in codes {
        let code = code.into();
        match Locale::parse(&code) {
            Some(locale) => {
                locales.insert(locale);
            }
            None => unknown.push(code),
        }
    }
    (locales, unknown)
}
