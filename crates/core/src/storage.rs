//! Object-storage capability consumed by the offload codec and model loader.
//!
//! Implementations live in `sdgate-cloud` (mounted directory, S3). Paths are
//! bucket-relative keys such as `images/alice/abc123_1.png`.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

/// Errors from an object-storage backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No object exists at the requested path.
    #[error("object not found: {0}")]
    NotFound(String),

    /// Local filesystem I/O failed.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The remote storage service rejected or failed the request.
    #[error("storage backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` at `path`, overwriting any existing object.
    async fn upload_bytes(&self, path: &str, bytes: Vec<u8>) -> Result<(), StorageError>;

    /// Fetch the full object at `path`.
    async fn download(&self, path: &str) -> Result<Vec<u8>, StorageError>;

    /// Fetch the object at `remote_path` and write it to `local_path`,
    /// creating parent directories as needed.
    ///
    /// The bytes land in a `.part` sibling that is renamed into place, so
    /// `local_path` only ever holds a complete file.
    async fn download_to_file(&self, remote_path: &str, local_path: &Path) -> Result<(), StorageError> {
        let bytes = self.download(remote_path).await?;
        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let part = part_path(local_path);
        let written = match tokio::fs::write(&part, bytes).await {
            Ok(()) => tokio::fs::rename(&part, local_path).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            if let Err(cleanup) = tokio::fs::remove_file(&part).await {
                tracing::debug!(path = %part.display(), error = %cleanup, "Partial download not removed");
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// Fetch the object at `path` as standard base64 text.
    async fn download_base64(&self, path: &str) -> Result<String, StorageError> {
        let bytes = self.download(path).await?;
        Ok(STANDARD.encode(bytes))
    }
}

/// In-progress download location for `local_path`: `{file name}.part`.
pub fn part_path(local_path: &Path) -> PathBuf {
    let mut name = local_path
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(".part");
    local_path.with_file_name(name)
}
