//! Domain entities mirrored from persistent storage.

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::locale::Locale;

/// A post flattened with exactly one of its translations.
///
/// Built at read time from the `posts` ⋈ `post_translations` join; never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentRecord {
    pub id: Uuid,
    pub slug: String,
    pub locale: Locale,
    pub title: String,
    pub description: String,
    pub markdown_path: String,
    pub tags: Vec<String>,
    pub author: Option<String>,
    pub published_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// One addressable page of the static site.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SlugLocale {
    pub slug: String,
    pub locale: Locale,
}

/// An uploaded image that has not necessarily been referenced by a published post.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingUploadRecord {
    pub path: String,
    pub public_url: String,
    pub uploaded_by: Option<String>,
    pub created_at: OffsetDateTime,
    pub claimed_at: Option<OffsetDateTime>,
}
