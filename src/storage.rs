//! Object storage for generated documents and uploads.
//!
//! Paths handed to an [`ObjectStorage`] are always relative to its root
//! (`documents/<uuid>_contract.docx`); only the storage knows where the root
//! lives.

use std::io::Write;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("invalid storage path `{0}`")]
    InvalidPath(String),
    #[error("file `{0}` not found")]
    NotFound(String),
    #[error("storage I/O failed for `{path}`: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("storage task failed: {0}")]
    Task(String),
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Write `data` to `path`, creating parent directories. The file appears
    /// atomically or not at all.
    async fn upload_file(&self, path: &str, data: &[u8]) -> Result<(), StorageError>;

    async fn download_file(&self, path: &str) -> Result<Vec<u8>, StorageError>;

    async fn delete_file(&self, path: &str) -> Result<(), StorageError>;
}

/// Filesystem storage rooted at a directory.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve a relative storage path, rejecting anything that could leave
    /// the root.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(path);
        let safe = !path.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));

        if !safe {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

fn io_error(path: &str) -> impl FnOnce(std::io::Error) -> StorageError + '_ {
    move |source| StorageError::Io {
        path: path.to_string(),
        source,
    }
}

#[async_trait]
impl ObjectStorage for LocalStorage {
    async fn upload_file(&self, path: &str, data: &[u8]) -> Result<(), StorageError> {
        let target = self.resolve(path)?;
        let len = data.len();
        let data = data.to_vec();
        let display = path.to_string();

        tokio::task::spawn_blocking(move || -> Result<(), StorageError> {
            let parent = target
                .parent()
                .ok_or_else(|| StorageError::InvalidPath(display.clone()))?;
            std::fs::create_dir_all(parent).map_err(io_error(&display))?;

            let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(io_error(&display))?;
            temp.write_all(&data).map_err(io_error(&display))?;
            temp.as_file().sync_all().map_err(io_error(&display))?;
            temp.persist(&target)
                .map_err(|e| io_error(&display)(e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| StorageError::Task(e.to_string()))??;

        log::debug!("Stored {} ({} bytes)", path, len);
        Ok(())
    }

    async fn download_file(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let target = self.resolve(path)?;
        match tokio::fs::read(&target).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.to_string()))
            }
            Err(e) => Err(io_error(path)(e)),
        }
    }

    async fn delete_file(&self, path: &str) -> Result<(), StorageError> {
        let target = self.resolve(path)?;
        match tokio::fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(path)(e)),
        }
    }
}
