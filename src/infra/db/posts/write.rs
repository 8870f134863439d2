use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::application::repos::{ContentWriteRepo, CreatePostParams, RepoError};
use crate::domain::entities::ContentRecord;

use crate::infra::db::{PostgresRepositories, map_sqlx_error};

#[async_trait]
impl ContentWriteRepo for PostgresRepositories {
    async fn create_post(&self, params: CreatePostParams) -> Result<ContentRecord, RepoError> {
        let CreatePostParams {
            slug,
            locale,
            title,
            description,
            markdown_path,
            tags,
            author,
            published_at,
        } = params;

        let post_id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        sqlx::query(
            "INSERT INTO posts (id, slug, author, tags, published_at, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $6)",
        )
        .bind(post_id)
        .bind(&slug)
        .bind(author.as_deref())
        .bind(&tags)
        .bind(published_at)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let description_value = (!description.is_empty()).then_some(description.as_str());
        sqlx::query(
            "INSERT INTO post_translations \
             (id, post_id, locale, title, description, markdown_path, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $7)",
        )
        .bind(Uuid::new_v4())
        .bind(post_id)
        .bind(locale.code())
        .bind(&title)
        .bind(description_value)
        .bind(&markdown_path)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(ContentRecord {
            id: post_id,
            slug,
            locale,
            title,
            description,
            markdown_path,
            tags,
            author,
            published_at,
            created_at: now,
            updated_at: now,
        })
    }
}
