//! Model loading: fetch the model file into the backend's model directory
//! and have the backend rescan its inventory.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use sdgate_core::model::{ModelAttributes, ModelType};
use sdgate_core::storage::{ObjectStore, StorageError};
use sdgate_sdapi::{SdApi, SdApiError};

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("model file fetch failed: {0}")]
    Storage(#[from] StorageError),

    #[error("backend refresh failed: {0}")]
    Backend(#[from] SdApiError),

    #[error("model directory I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Makes one model resident on the backend.
#[async_trait]
pub trait ModelLoader: Send + Sync {
    async fn load(&self, model: &ModelAttributes) -> Result<(), LoadError>;
}

/// Loader for a WebUI backend sharing `models_dir` with this process.
pub struct BackendModelLoader {
    store: Arc<dyn ObjectStore>,
    sd: SdApi,
    models_dir: PathBuf,
}

impl BackendModelLoader {
    pub fn new(store: Arc<dyn ObjectStore>, sd: SdApi, models_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            sd,
            models_dir: models_dir.into(),
        }
    }

    /// Where the backend expects the file for `model`.
    pub fn local_path(&self, model: &ModelAttributes) -> PathBuf {
        model_file_path(&self.models_dir, model)
    }

    async fn refresh(&self, model_type: ModelType) -> Result<(), SdApiError> {
        match model_type {
            ModelType::StableDiffusion => self.sd.refresh_checkpoints().await,
            ModelType::SdVae => self.sd.refresh_vae().await,
            ModelType::ControlNet => self.sd.list_controlnet_models().await.map(|_| ()),
            // The WebUI rescans LoRA files on every generation request.
            ModelType::Lora => Ok(()),
        }
    }
}

pub fn model_file_path(models_dir: &Path, model: &ModelAttributes) -> PathBuf {
    models_dir.join(model.model_type.dir_name()).join(&model.name)
}

#[async_trait]
impl ModelLoader for BackendModelLoader {
    async fn load(&self, model: &ModelAttributes) -> Result<(), LoadError> {
        let local = self.local_path(model);
        if !tokio::fs::try_exists(&local).await? {
            tracing::info!(
                model = %model.name,
                model_type = %model.model_type,
                path = %local.display(),
                "Downloading model file",
            );
            self.store
                .download_to_file(&model.storage_path(), &local)
                .await?;
        }
        self.refresh(model.model_type).await?;
        tracing::info!(model = %model.name, model_type = %model.model_type, "Backend inventory refreshed");
        Ok(())
    }
}
