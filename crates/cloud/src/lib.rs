//! Object-storage backends for generated images and model files.

pub mod local;
pub mod s3;

use std::path::PathBuf;
use std::sync::Arc;

use sdgate_core::storage::{ObjectStore, StorageError};

pub use local::LocalObjectStore;
pub use s3::S3ObjectStore;

/// Where objects live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    /// A mounted directory (NAS or bucket mount).
    Local,
    /// An S3-compatible bucket reached over the network.
    Remote,
}

impl StorageMode {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "local" => Some(Self::Local),
            "remote" => Some(Self::Remote),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Remote => "remote",
        }
    }
}

/// Settings needed to construct the process-wide object store.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub mode: StorageMode,
    /// Root directory for [`StorageMode::Local`].
    pub local_root: PathBuf,
    pub bucket: Option<String>,
    pub region: Option<String>,
    /// Endpoint override for S3-compatible services.
    pub endpoint: Option<String>,
}

/// Build the object store selected by `config`.
pub async fn build_store(config: &StorageConfig) -> Result<Arc<dyn ObjectStore>, StorageError> {
    let store: Arc<dyn ObjectStore> = match config.mode {
        StorageMode::Local => Arc::new(LocalObjectStore::new(&config.local_root)),
        StorageMode::Remote => {
            let bucket = config.bucket.clone().ok_or_else(|| {
                StorageError::Backend("OSS_BUCKET is required when OSS_MODE=remote".into())
            })?;
            Arc::new(
                S3ObjectStore::from_env(bucket, config.region.clone(), config.endpoint.clone())
                    .await,
            )
        }
    };
    tracing::info!(mode = config.mode.as_str(), "Object store ready");
    Ok(store)
}
