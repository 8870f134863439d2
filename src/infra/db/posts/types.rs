use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::RepoError;
use crate::domain::entities::ContentRecord;
use crate::domain::locale::Locale;

/// One row of the `posts ⋈ post_translations` join.
#[derive(sqlx::FromRow)]
pub(crate) struct ContentRow {
    pub(crate) id: Uuid,
    pub(crate) slug: String,
    pub(crate) locale: String,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) markdown_path: String,
    pub(crate) tags: Vec<String>,
    pub(crate) author: Option<String>,
    pub(crate) published_at: OffsetDateTime,
    pub(crate) created_at: OffsetDateTime,
    pub(crate) updated_at: OffsetDateTime,
}

impl TryFrom<ContentRow> for ContentRecord {
    type Error = RepoError;

    fn try_from(row: ContentRow) -> Result<Self, Self::Error> {
        let locale = Locale::parse(&row.locale).ok_or_else(|| RepoError::InvalidInput {
            message: format!("unsupported locale `{}` for post `{}`", row.locale, row.slug),
        })?;

        Ok(Self {
            id: row.id,
            slug: row.slug,
            locale,
            title: row.title,
            description: row.description.unwrap_or_default(),
            markdown_path: row.markdown_path,
            tags: row.tags,
            author: row.author,
            published_at: row.published_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct SlugLocaleRow {
    pub(crate) slug: String,
    pub(crate) locale: String,
}
