//! Publishing new posts from the admin composer.

use std::str::FromStr;
use std::sync::Arc;

use axum::http::StatusCode;
use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::application::auth::AdminUser;
use crate::application::deploy::DeployService;
use crate::application::error::HttpError;
use crate::application::repos::{
    ContentRepo, ContentWriteRepo, CreatePostParams, RepoError, UploadsRepo,
};
use crate::application::storage::{ObjectStore, StorageError};
use crate::domain::entities::ContentRecord;
use crate::domain::error::DomainError;
use crate::domain::locale::Locale;
use crate::domain::posts::{parse_tags, summarize_description};
use crate::domain::slug::{derive_slug, with_collision_suffix};

const MAX_SLUG_ATTEMPTS: usize = 4;
const MARKDOWN_CONTENT_TYPE: &str = "text/markdown; charset=utf-8";

/// Raw form fields as submitted by the composer.
#[derive(Debug, Clone, Default)]
pub struct ComposeInput {
    pub title: String,
    pub body: String,
    pub tags: String,
    pub language: String,
}

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error(transparent)]
    Validation(#[from] DomainError),
    #[error("failed to store markdown body")]
    Storage(#[from] StorageError),
    #[error("failed to insert post")]
    Repo(#[from] RepoError),
    #[error("no free slug for `{base}` after {attempts} attempts")]
    SlugExhausted { base: String, attempts: usize },
}

impl ComposeError {
    pub fn status(&self) -> StatusCode {
        match self {
            ComposeError::Validation(_) => StatusCode::BAD_REQUEST,
            ComposeError::SlugExhausted { .. } => StatusCode::CONFLICT,
            ComposeError::Storage(_) => StatusCode::BAD_GATEWAY,
            ComposeError::Repo(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show the author.
    pub fn user_message(&self) -> String {
        match self {
            ComposeError::Validation(DomainError::Validation { message, .. }) => message.clone(),
            ComposeError::Validation(err) => err.to_string(),
            ComposeError::SlugExhausted { .. } => {
                "Could not find a free slug for this title, please try again".to_string()
            }
            ComposeError::Storage(_) | ComposeError::Repo(_) => {
                "Publishing failed, please try again".to_string()
            }
        }
    }
}

impl From<ComposeError> for HttpError {
    fn from(err: ComposeError) -> Self {
        let message = match err {
            ComposeError::Validation(_) => "Invalid post",
            ComposeError::SlugExhausted { .. } => "Slug unavailable",
            ComposeError::Storage(_) | ComposeError::Repo(_) => "Publishing failed",
        };
        HttpError::from_error("application::composer", err.status(), message, &err)
    }
}

/// Result of notifying the deploy hook after a publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DeployOutcome {
    Triggered { job_id: Option<String> },
    Skipped,
    Failed { message: String },
}

#[derive(Debug, Clone)]
pub struct PublishOutcome {
    pub record: ContentRecord,
    pub deploy: DeployOutcome,
}

impl PublishOutcome {
    pub fn is_degraded(&self) -> bool {
        matches!(self.deploy, DeployOutcome::Failed { .. })
    }

    pub fn message(&self) -> String {
        match &self.deploy {
            DeployOutcome::Triggered { .. } => {
                "Article published successfully! A site rebuild was triggered.".to_string()
            }
            DeployOutcome::Skipped => "Article published successfully!".to_string(),
            DeployOutcome::Failed { message } => {
                format!("Article published, but the site rebuild could not be triggered: {message}")
            }
        }
    }
}

#[derive(Clone)]
pub struct PostComposer {
    content: Arc<dyn ContentRepo>,
    writer: Arc<dyn ContentWriteRepo>,
    uploads: Arc<dyn UploadsRepo>,
    store: Arc<dyn ObjectStore>,
    markdown_bucket: String,
    deploy: DeployService,
}

impl PostComposer {
    pub fn new(
        content: Arc<dyn ContentRepo>,
        writer: Arc<dyn ContentWriteRepo>,
        uploads: Arc<dyn UploadsRepo>,
        store: Arc<dyn ObjectStore>,
        markdown_bucket: impl Into<String>,
        deploy: DeployService,
    ) -> Self {
        Self {
            content,
            writer,
            uploads,
            store,
            markdown_bucket: markdown_bucket.into(),
            deploy,
        }
    }

    pub async fn publish(
        &self,
        input: ComposeInput,
        author: Option<&AdminUser>,
    ) -> Result<PublishOutcome, ComposeError> {
        let title = input.title.trim();
        if title.is_empty() {
            return Err(DomainError::validation("title", "Title is required").into());
        }
        let locale = Locale::from_str(input.language.trim()).map_err(DomainError::from)?;
        let tags = parse_tags(&input.tags);
        let description = summarize_description(&input.body);
        let author = author.and_then(|user| user.email.clone().or_else(|| Some(user.id.clone())));

        let now = OffsetDateTime::now_utc();
        let base = derive_slug(title, locale, now);
        let mut slug = if self.content.slug_exists(&base).await? {
            with_collision_suffix(&base, now)
        } else {
            base.clone()
        };

        let body = Bytes::from(input.body.clone());
        let mut attempt = 1;
        let record = loop {
            let markdown_path = format!("{slug}/{}.md", locale.code());
            let stored = self
                .store
                .put(
                    &self.markdown_bucket,
                    &markdown_path,
                    MARKDOWN_CONTENT_TYPE,
                    body.clone(),
                )
                .await;
            match stored {
                Ok(()) => {}
                Err(err) if err.is_conflict() => {
                    // Another post already owns this key; leave its body alone.
                    slug = self.retry_slug(&base, &slug, &mut attempt)?;
                    continue;
                }
                Err(err) => return Err(err.into()),
            }

            let params = CreatePostParams {
                slug: slug.clone(),
                locale,
                title: title.to_string(),
                description: description.clone(),
                markdown_path: markdown_path.clone(),
                tags: tags.clone(),
                author: author.clone(),
                published_at: now,
            };

            match self.writer.create_post(params).await {
                Ok(record) => break record,
                Err(err) => {
                    self.discard_body(&markdown_path).await;
                    if !err.is_duplicate_slug() {
                        return Err(err.into());
                    }
                    slug = self.retry_slug(&base, &slug, &mut attempt)?;
                }
            }
        };

        match self.uploads.claim_referenced(&input.body).await {
            Ok(claimed) if claimed > 0 => {
                info!(target = "folio::composer", slug = %record.slug, claimed, "claimed uploads");
            }
            Ok(_) => {}
            Err(err) => {
                warn!(target = "folio::composer", slug = %record.slug, error = %err, "failed to claim uploads");
            }
        }

        metrics::counter!("folio_posts_published_total").increment(1);
        info!(
            target = "folio::composer",
            slug = %record.slug,
            locale = %record.locale,
            "post published"
        );

        let deploy = if self.deploy.is_configured() {
            match self.deploy.trigger().await {
                Ok(receipt) => DeployOutcome::Triggered {
                    job_id: receipt.job_id,
                },
                Err(err) => DeployOutcome::Failed {
                    message: err.to_string(),
                },
            }
        } else {
            DeployOutcome::Skipped
        };

        Ok(PublishOutcome { record, deploy })
    }

    fn retry_slug(
        &self,
        base: &str,
        taken: &str,
        attempt: &mut usize,
    ) -> Result<String, ComposeError> {
        if *attempt >= MAX_SLUG_ATTEMPTS {
            return Err(ComposeError::SlugExhausted {
                base: base.to_string(),
                attempts: *attempt,
            });
        }
        warn!(target = "folio::composer", slug = %taken, attempt = *attempt, "slug taken, retrying");
        *attempt += 1;
        Ok(next_candidate(base, taken, *attempt))
    }

    async fn discard_body(&self, path: &str) {
        if let Err(err) = self.store.delete(&self.markdown_bucket, path).await {
            warn!(target = "folio::composer", path = %path, error = %err, "failed to delete orphaned body");
        }
    }
}

fn next_candidate(base: &str, previous: &str, attempt: usize) -> String {
    let candidate = with_collision_suffix(base, OffsetDateTime::now_utc());
    if candidate == previous {
        format!("{candidate}-{attempt}")
    } else {
        candidate
    }
}
