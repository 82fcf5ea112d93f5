//! Request and response payloads of the backend REST API.

use serde::{Deserialize, Serialize};

/// Snapshot returned by `GET /sdapi/v1/progress`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressResult {
    /// Preview of the image in progress, base64, may be empty.
    #[serde(default)]
    pub current_image: Option<String>,
    #[serde(default)]
    pub eta_relative: f64,
    /// Fraction complete in `[0, 1]`.
    #[serde(default)]
    pub progress: f64,
    #[serde(default)]
    pub state: ProgressState,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressState {
    #[serde(default)]
    pub interrupted: bool,
    #[serde(default)]
    pub job: String,
    #[serde(default)]
    pub job_count: i64,
    #[serde(default)]
    pub job_no: i64,
    #[serde(default)]
    pub job_timestamp: String,
    #[serde(default)]
    pub sampling_step: i64,
    #[serde(default)]
    pub sampling_steps: i64,
    #[serde(default)]
    pub skipped: bool,
}

/// Entry of `GET /sdapi/v1/sd-models`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdModelInfo {
    pub title: String,
    pub model_name: String,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub sha256: Option<String>,
    pub filename: String,
}

/// Entry of `GET /sdapi/v1/sd-vae`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SdVaeInfo {
    pub model_name: String,
    pub filename: String,
}

/// Body of `GET /controlnet/model_list`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ControlNetModelList {
    #[serde(default)]
    pub model_list: Vec<String>,
}
