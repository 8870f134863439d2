use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{RecordUploadParams, RepoError, UploadsRepo},
    domain::entities::PendingUploadRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct PendingUploadRow {
    path: String,
    public_url: String,
    uploaded_by: Option<String>,
    created_at: OffsetDateTime,
    claimed_at: Option<OffsetDateTime>,
}

impl From<PendingUploadRow> for PendingUploadRecord {
    fn from(row: PendingUploadRow) -> Self {
        Self {
            path: row.path,
            public_url: row.public_url,
            uploaded_by: row.uploaded_by,
            created_at: row.created_at,
            claimed_at: row.claimed_at,
        }
    }
}

#[async_trait]
impl UploadsRepo for PostgresRepositories {
    async fn record_pending(&self, params: RecordUploadParams) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO pending_uploads (path, public_url, uploaded_by) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (path) DO NOTHING",
        )
        .bind(&params.path)
        .bind(&params.public_url)
        .bind(params.uploaded_by.as_deref())
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn claim_referenced(&self, body: &str) -> Result<u64, RepoError> {
        let result = sqlx::query(
            "UPDATE pending_uploads SET claimed_at = now() \
             WHERE claimed_at IS NULL AND strpos($1, public_url) > 0",
        )
        .bind(body)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn release_unclaimed(
        &self,
        paths: &[String],
    ) -> Result<Vec<PendingUploadRecord>, RepoError> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query_as::<_, PendingUploadRow>(
            "DELETE FROM pending_uploads \
             WHERE claimed_at IS NULL AND path = ANY($1) \
             RETURNING path, public_url, uploaded_by, created_at, claimed_at",
        )
        .bind(paths)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(PendingUploadRecord::from).collect())
    }

    async fn restore_pending(&self, record: &PendingUploadRecord) -> Result<(), RepoError> {
        sqlx::query(
            "INSERT INTO pending_uploads (path, public_url, uploaded_by, created_at) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (path) DO NOTHING",
        )
        .bind(&record.path)
        .bind(&record.public_url)
        .bind(record.uploaded_by.as_deref())
        .bind(record.created_at)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn list_unclaimed_before(
        &self,
        cutoff: OffsetDateTime,
    ) -> Result<Vec<PendingUploadRecord>, RepoError> {
        let rows = sqlx::query_as::<_, PendingUploadRow>(
            "SELECT path, public_url, uploaded_by, created_at, claimed_at \
             FROM pending_uploads \
             WHERE claimed_at IS NULL AND created_at < $1 \
             ORDER BY created_at",
        )
        .bind(cutoff)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(PendingUploadRecord::from).collect())
    }
}
