//! Directory-backed object store: `<root>/<bucket>/<path>`.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::{fs, io::AsyncWriteExt};

use crate::application::storage::{ObjectStore, StorageError, validate_object_path};

#[derive(Debug)]
pub struct FilesystemStore {
    root: PathBuf,
    public_base: String,
}

impl FilesystemStore {
    /// Initialise storage rooted at the provided directory, creating it if necessary.
    ///
    /// `public_base` is the URL prefix the HTTP layer serves the root under.
    pub fn new(root: PathBuf, public_base: impl Into<String>) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            public_base: public_base.into().trim_end_matches('/').to_string(),
        })
    }

    fn resolve(&self, bucket: &str, path: &str) -> Result<PathBuf, StorageError> {
        let path = validate_object_path(path)?;
        let bucket_path = Path::new(bucket);
        let relative = Path::new(path);
        let escapes = |candidate: &Path| {
            candidate.is_absolute()
                || candidate.components().any(|component| {
                    matches!(
                        component,
                        Component::ParentDir | Component::Prefix(_) | Component::RootDir
                    )
                })
        };
        if bucket.is_empty() || escapes(bucket_path) || escapes(relative) {
            return Err(StorageError::InvalidPath(format!("{bucket}/{path}")));
        }
        Ok(self.root.join(bucket_path).join(relative))
    }
}

#[async_trait]
impl ObjectStore for FilesystemStore {
    async fn get(&self, bucket: &str, path: &str) -> Result<Bytes, StorageError> {
        let absolute = self.resolve(bucket, path)?;
        match fs::read(&absolute).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(StorageError::Missing {
                bucket: bucket.to_string(),
                path: path.to_string(),
            }),
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    async fn put(
        &self,
        bucket: &str,
        path: &str,
        _content_type: &str,
        data: Bytes,
    ) -> Result<(), StorageError> {
        let absolute = self.resolve(bucket, path)?;
        if let Some(parent) = absolute.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&absolute)
            .await
        {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StorageError::Conflict {
                    bucket: bucket.to_string(),
                    path: path.to_string(),
                });
            }
            Err(err) => return Err(StorageError::Io(err)),
        };

        if let Err(err) = file.write_all(&data).await {
            drop(file);
            let _ = fs::remove_file(&absolute).await;
            return Err(StorageError::Io(err));
        }
        file.flush().await?;
        Ok(())
    }

    /// Missing files are treated as success.
    async fn delete(&self, bucket: &str, path: &str) -> Result<(), StorageError> {
        let absolute = self.resolve(bucket, path)?;
        match fs::remove_file(&absolute).await {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("{}/{bucket}/{path}", self.public_base)
    }
}
