use async_trait::async_trait;
use futures::{StreamExt, future, stream::BoxStream};
use tracing::warn;

use crate::application::repos::{ContentRepo, RepoError};
use crate::domain::entities::{ContentRecord, SlugLocale};
use crate::domain::locale::Locale;

use super::types::{ContentRow, SlugLocaleRow};
use crate::infra::db::{PostgresRepositories, map_sqlx_error};

const CONTENT_COLUMNS: &str = "SELECT p.id, p.slug, t.locale, t.title, t.description, \
     t.markdown_path, p.tags, p.author, p.published_at, p.created_at, p.updated_at \
     FROM posts p \
     INNER JOIN post_translations t ON t.post_id = p.id";

#[async_trait]
impl ContentRepo for PostgresRepositories {
    async fn list_posts(&self, locale: Locale) -> Result<Vec<ContentRecord>, RepoError> {
        let sql = format!(
            "{CONTENT_COLUMNS} WHERE t.locale = $1 ORDER BY p.published_at DESC, p.id DESC"
        );
        let rows = sqlx::query_as::<_, ContentRow>(&sql)
            .bind(locale.code())
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        rows.into_iter().map(ContentRecord::try_from).collect()
    }

    async fn find_post(&self, slug: &str, locale: Locale) -> Result<ContentRecord, RepoError> {
        let sql = format!("{CONTENT_COLUMNS} WHERE p.slug = $1 AND t.locale = $2");
        let row = sqlx::query_as::<_, ContentRow>(&sql)
            .bind(slug)
            .bind(locale.code())
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        ContentRecord::try_from(row)
    }

    async fn list_locale_codes(&self, slug: &str) -> Result<Vec<String>, RepoError> {
        sqlx::query_scalar::<_, String>(
            "SELECT t.locale FROM post_translations t \
             INNER JOIN posts p ON p.id = t.post_id \
             WHERE p.slug = $1 ORDER BY t.locale",
        )
        .bind(slug)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)
    }

    async fn slug_exists(&self, slug: &str) -> Result<bool, RepoError> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM posts WHERE slug = $1)")
            .bind(slug)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)
    }

    fn stream_slug_locales(&self) -> BoxStream<'_, Result<SlugLocale, RepoError>> {
        let stream = sqlx::query_as::<_, SlugLocaleRow>(
            "SELECT p.slug, t.locale FROM posts p \
             INNER JOIN post_translations t ON t.post_id = p.id \
             ORDER BY p.slug, t.locale",
        )
        .fetch(self.pool())
        .filter_map(|row| {
            let item = match row {
                Ok(row) => match Locale::parse(&row.locale) {
                    Some(locale) => Some(Ok(SlugLocale {
                        slug: row.slug,
                        locale,
                    })),
                    None => {
                        warn!(
                            target = "folio::db",
                            slug = %row.slug,
                            locale = %row.locale,
                            "skipping translation with unsupported locale"
                        );
                        None
                    }
                },
                Err(err) => Some(Err(map_sqlx_error(err))),
            };
            future::ready(item)
        });

        Box::pin(stream)
    }
}
