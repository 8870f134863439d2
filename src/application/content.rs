//! Locale-aware content resolution.

use std::collections::BTreeSet;
use std::sync::Arc;

use axum::http::StatusCode;
use futures::{StreamExt, stream::BoxStream};
use thiserror::Error;
use tracing::warn;

use crate::application::error::HttpError;
use crate::application::repos::{ContentRepo, RepoError, known_locales};
use crate::domain::entities::{ContentRecord, SlugLocale};
use crate::domain::locale::Locale;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("failed to retrieve content")]
    Retrieval(#[from] RepoError),
}

impl From<ContentError> for HttpError {
    fn from(err: ContentError) -> Self {
        HttpError::from_error(
            "application::content",
            StatusCode::INTERNAL_SERVER_ERROR,
            "Content is temporarily unavailable",
            &err,
        )
    }
}

#[derive(Clone)]
pub struct ContentService {
    repo: Arc<dyn ContentRepo>,
}

impl ContentService {
    pub fn new(repo: Arc<dyn ContentRepo>) -> Self {
        Self { repo }
    }

    pub async fn list_posts(&self, locale: Locale) -> Result<Vec<ContentRecord>, ContentError> {
        match self.repo.list_posts(locale).await {
            Ok(posts) => Ok(posts),
            Err(RepoError::NotFound) => Ok(Vec::new()),
            Err(err) => Err(err.into()),
        }
    }

    /// The post in exactly the requested locale; never falls back to another translation.
    pub async fn get_post(
        &self,
        slug: &str,
        locale: Locale,
    ) -> Result<Option<ContentRecord>, ContentError> {
        match self.repo.find_post(slug, locale).await {
            Ok(post) => Ok(Some(post)),
            Err(RepoError::NotFound) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn list_locales_for_slug(
        &self,
        slug: &str,
    ) -> Result<BTreeSet<Locale>, ContentError> {
        let codes = match self.repo.list_locale_codes(slug).await {
            Ok(codes) => codes,
            Err(RepoError::NotFound) => return Ok(BTreeSet::new()),
            Err(err) => return Err(err.into()),
        };

        let (locales, unknown) = known_locales(codes);
        if !unknown.is_empty() {
            warn!(
                target = "folio::content",
                slug = %slug,
                unknown = ?unknown,
                "skipping translations with unsupported locale codes"
            );
        }
        Ok(locales)
    }

    /// Every (slug, locale) pair that should be pre-rendered.
    pub fn all_slug_locale_pairs(&self) -> BoxStream<'_, Result<SlugLocale, ContentError>> {
        self.repo
            .stream_slug_locales()
            .map(|item| item.map_err(ContentError::from))
            .boxed()
    }

    pub async fn slug_exists(&self, slug: &str) -> Result<bool, ContentError> {
        Ok(self.repo.slug_exists(slug).await?)
    }
}
