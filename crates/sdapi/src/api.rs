//! REST API client for one Stable Diffusion WebUI instance.
//!
//! Wraps the inventory, generation, interruption and progress endpoints
//! using [`reqwest`].

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::messages::{ControlNetModelList, ProgressResult, SdModelInfo, SdVaeInfo};

pub const SD_MODELS_PATH: &str = "/sdapi/v1/sd-models";
pub const REFRESH_CHECKPOINTS_PATH: &str = "/sdapi/v1/refresh-checkpoints";
pub const SD_VAE_PATH: &str = "/sdapi/v1/sd-vae";
pub const REFRESH_VAE_PATH: &str = "/sdapi/v1/refresh-vae";
pub const CONTROLNET_MODEL_LIST_PATH: &str = "/controlnet/model_list";
pub const INTERRUPT_PATH: &str = "/sdapi/v1/interrupt";
pub const TXT2IMG_PATH: &str = "/sdapi/v1/txt2img";
pub const IMG2IMG_PATH: &str = "/sdapi/v1/img2img";
pub const PROGRESS_PATH: &str = "/sdapi/v1/progress";
pub const EXTRA_SINGLE_IMAGE_PATH: &str = "/sdapi/v1/extra-single-image";

/// HTTP client for a single backend instance.
#[derive(Debug, Clone)]
pub struct SdApi {
    client: reqwest::Client,
    api_url: String,
}

/// Errors from the backend REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum SdApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend returned a non-2xx status code.
    #[error("SD API error ({status}): {body}")]
    ApiError {
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

impl SdApiError {
    /// Whether the failure was the client-side request timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Request(e) if e.is_timeout())
    }
}

impl SdApi {
    /// Create a client for the instance at `api_url`, e.g.
    /// `http://127.0.0.1:7861`. A trailing slash is ignored.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Create a client reusing an existing [`reqwest::Client`] so several
    /// instances share one connection pool.
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        Self { client, api_url }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    // ---- inventory ----

    pub async fn list_sd_models(&self) -> Result<Vec<SdModelInfo>, SdApiError> {
        self.get_json(SD_MODELS_PATH).await
    }

    /// Ask the backend to rescan its checkpoint directory.
    pub async fn refresh_checkpoints(&self) -> Result<(), SdApiError> {
        self.post_empty(REFRESH_CHECKPOINTS_PATH).await
    }

    pub async fn list_sd_vae(&self) -> Result<Vec<SdVaeInfo>, SdApiError> {
        self.get_json(SD_VAE_PATH).await
    }

    /// Ask the backend to rescan its VAE directory.
    pub async fn refresh_vae(&self) -> Result<(), SdApiError> {
        self.post_empty(REFRESH_VAE_PATH).await
    }

    /// Listing ControlNet models also makes the extension rescan its directory.
    pub async fn list_controlnet_models(&self) -> Result<Vec<String>, SdApiError> {
        let list: ControlNetModelList = self.get_json(CONTROLNET_MODEL_LIST_PATH).await?;
        Ok(list.model_list)
    }

    // ---- generation ----

    pub async fn txt2img(&self, body: &Value) -> Result<Value, SdApiError> {
        self.post_json(TXT2IMG_PATH, body).await
    }

    pub async fn img2img(&self, body: &Value) -> Result<Value, SdApiError> {
        self.post_json(IMG2IMG_PATH, body).await
    }

    pub async fn extra_single_image(&self, body: &Value) -> Result<Value, SdApiError> {
        self.post_json(EXTRA_SINGLE_IMAGE_PATH, body).await
    }

    /// Post `body` to an arbitrary backend path and return the JSON reply.
    pub async fn post_json(&self, path: &str, body: &Value) -> Result<Value, SdApiError> {
        let response = self.client.post(self.url(path)).json(body).send().await?;
        Self::parse_response(response).await
    }

    // ---- control ----

    /// Interrupt whatever the backend is generating right now.
    pub async fn interrupt(&self) -> Result<(), SdApiError> {
        self.post_empty(INTERRUPT_PATH).await
    }

    pub async fn progress(&self) -> Result<ProgressResult, SdApiError> {
        self.get_json(PROGRESS_PATH).await
    }

    // ---- private helpers ----

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, SdApiError> {
        let response = self.client.get(self.url(path)).send().await?;
        Self::parse_response(response).await
    }

    async fn post_empty(&self, path: &str) -> Result<(), SdApiError> {
        let response = self.client.post(self.url(path)).send().await?;
        Self::check_status(response).await
    }

    /// Return the response unchanged on a 2xx status, otherwise an
    /// [`SdApiError::ApiError`] carrying the status and body text.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, SdApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            tracing::debug!(status = status.as_u16(), "SD API returned error status");
            return Err(SdApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, SdApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    async fn check_status(response: reqwest::Response) -> Result<(), SdApiError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}
