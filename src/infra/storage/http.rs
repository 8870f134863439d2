//! Client for a bucket API exposed under `<backend>/storage/v1`.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, RequestBuilder, StatusCode, header};
use url::Url;

use crate::application::storage::{ObjectStore, StorageError, validate_object_path};
use crate::infra::backend::endpoint;

#[derive(Clone)]
pub struct HttpObjectStore {
    client: Client,
    base: Url,
    key: Option<String>,
}

impl HttpObjectStore {
    pub fn new(client: Client, base: Url, key: Option<String>) -> Self {
        Self { client, base, key }
    }

    fn object_url(&self, prefix: &[&str], bucket: &str, path: &str) -> Result<Url, StorageError> {
        let path = validate_object_path(path)?;
        let segments = ["storage", "v1", "object"]
            .into_iter()
            .chain(prefix.iter().copied())
            .chain(std::iter::once(bucket))
            .chain(path.split('/'));
        endpoint(&self.base, segments).map_err(|err| StorageError::Transport(err.to_string()))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.key.as_deref() {
            Some(key) => request.header("apikey", key).bearer_auth(key),
            None => request,
        }
    }
}

fn transport(err: reqwest::Error) -> StorageError {
    StorageError::Transport(err.to_string())
}

/// The storage API reports some 404s as a 400 with a JSON body naming the error.
fn is_not_found(status: StatusCode, body: &str) -> bool {
    status == StatusCode::NOT_FOUND
        || (status == StatusCode::BAD_REQUEST
            && (body.contains("not_found") || body.contains("Object not found")))
}

fn is_duplicate(status: StatusCode, body: &str) -> bool {
    status == StatusCode::CONFLICT
        || (status == StatusCode::BAD_REQUEST
            && (body.contains("Duplicate") || body.contains("already exists")))
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn get(&self, bucket: &str, path: &str) -> Result<Bytes, StorageError> {
        let url = self.object_url(&[], bucket, path)?;
        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if status.is_success() {
            return response.bytes().await.map_err(transport);
        }

        let body = response.text().await.unwrap_or_default();
        if is_not_found(status, &body) {
            return Err(StorageError::Missing {
                bucket: bucket.to_string(),
                path: path.to_string(),
            });
        }
        Err(StorageError::Rejected {
            status: status.as_u16(),
            body,
        })
    }

    async fn put(
        &self,
        bucket: &str,
        path: &str,
        content_type: &str,
        data: Bytes,
    ) -> Result<(), StorageError> {
        let url = self.object_url(&[], bucket, path)?;
        let response = self
            .authorize(self.client.post(url))
            .header(header::CONTENT_TYPE, content_type)
            .header("x-upsert", "false")
            .body(data)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        if is_duplicate(status, &body) {
            return Err(StorageError::Conflict {
                bucket: bucket.to_string(),
                path: path.to_string(),
            });
        }
        Err(StorageError::Rejected {
            status: status.as_u16(),
            body,
        })
    }

    async fn delete(&self, bucket: &str, path: &str) -> Result<(), StorageError> {
        let url = self.object_url(&[], bucket, path)?;
        let response = self
            .authorize(self.client.delete(url))
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        if is_not_found(status, &body) {
            return Ok(());
        }
        Err(StorageError::Rejected {
            status: status.as_u16(),
            body,
        })
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        match self.object_url(&["public"], bucket, path) {
            Ok(url) => url.to_string(),
            Err(_) => format!(
                "{}/storage/v1/object/public/{bucket}/{path}",
                self.base.as_str().trim_end_matches('/')
            ),
        }
    }
}
