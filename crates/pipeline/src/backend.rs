//! Generation calls against a resolved backend endpoint.

use std::time::Duration;

use async_trait::async_trait;
use sdgate_sdapi::api::{EXTRA_SINGLE_IMAGE_PATH, IMG2IMG_PATH, TXT2IMG_PATH};
use sdgate_sdapi::messages::{ProgressResult, SdModelInfo, SdVaeInfo};
use sdgate_sdapi::{SdApi, SdApiError};
use serde_json::Value;

/// The generation operations a client may submit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationKind {
    Txt2Img,
    Img2Img,
    ExtraSingleImage,
}

impl GenerationKind {
    /// Backend API path, recorded as the task's `version`.
    pub fn path(self) -> &'static str {
        match self {
            Self::Txt2Img => TXT2IMG_PATH,
            Self::Img2Img => IMG2IMG_PATH,
            Self::ExtraSingleImage => EXTRA_SINGLE_IMAGE_PATH,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend request timed out")]
    Timeout,

    #[error("backend request failed: {0}")]
    Failed(String),
}

impl From<SdApiError> for BackendError {
    fn from(err: SdApiError) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Failed(err.to_string())
        }
    }
}

/// Executes generation requests on a backend instance and exposes its
/// checkpoint and VAE inventory.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(
        &self,
        endpoint: &str,
        kind: GenerationKind,
        body: &Value,
    ) -> Result<Value, BackendError>;

    async fn progress(&self, endpoint: &str) -> Result<ProgressResult, BackendError>;

    /// Stop the job the backend is running.
    async fn interrupt(&self, endpoint: &str) -> Result<(), BackendError>;

    async fn sd_models(&self, endpoint: &str) -> Result<Vec<SdModelInfo>, BackendError>;

    async fn sd_vaes(&self, endpoint: &str) -> Result<Vec<SdVaeInfo>, BackendError>;
}

/// [`GenerationBackend`] over the WebUI REST API, sharing one connection
/// pool across endpoints.
pub struct SdBackend {
    client: reqwest::Client,
}

impl SdBackend {
    /// `timeout` bounds each backend call end to end.
    pub fn new(timeout: Duration) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::Failed(e.to_string()))?;
        Ok(Self { client })
    }

    fn api(&self, endpoint: &str) -> SdApi {
        SdApi::with_client(self.client.clone(), endpoint)
    }
}

#[async_trait]
impl GenerationBackend for SdBackend {
    async fn generate(
        &self,
        endpoint: &str,
        kind: GenerationKind,
        body: &Value,
    ) -> Result<Value, BackendError> {
        let api = self.api(endpoint);
        let reply = match kind {
            GenerationKind::Txt2Img => api.txt2img(body).await?,
            GenerationKind::Img2Img => api.img2img(body).await?,
            GenerationKind::ExtraSingleImage => api.extra_single_image(body).await?,
        };
        Ok(reply)
    }

    async fn progress(&self, endpoint: &str) -> Result<ProgressResult, BackendError> {
        Ok(self.api(endpoint).progress().await?)
    }

    async fn interrupt(&self, endpoint: &str) -> Result<(), BackendError> {
        self.api(endpoint).interrupt().await?;
        tracing::info!(endpoint, "Backend job interrupted");
        Ok(())
    }

    async fn sd_models(&self, endpoint: &str) -> Result<Vec<SdModelInfo>, BackendError> {
        Ok(self.api(endpoint).list_sd_models().await?)
    }

    async fn sd_vaes(&self, endpoint: &str) -> Result<Vec<SdVaeInfo>, BackendError> {
        Ok(self.api(endpoint).list_sd_vae().await?)
    }
}
