//! Endpoint resolution for generation requests.
//!
//! Picks a live backend endpoint for a model using the function registry
//! and the local model status. A miss is reported as the retryable
//! [`DispatchError::NoEndpoint`], distinct from malformed requests.

use std::sync::Arc;

use async_trait::async_trait;
use sdgate_core::model::{ModelAttributes, ModelStatus, ModelType};
use sdgate_db::{FunctionField, FunctionStore, FunctionUpdate, RegistryError};

/// Message returned to clients when no backend serves the model yet.
pub const NO_ENDPOINT_MESSAGE: &str = "not found sd endpoint, please retry";

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// No live endpoint serves `model`; clients should retry.
    #[error("not found sd endpoint, please retry")]
    NoEndpoint(String),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),
}

/// How function records map onto backend instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlexMode {
    /// One function hosts every model; its record is keyed by the function name.
    SingleFunc,
    /// One function per model; records are matched by their bound model.
    MultiFunc,
}

impl FlexMode {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "singleFunc" => Some(Self::SingleFunc),
            "multiFunc" => Some(Self::MultiFunc),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SingleFunc => "singleFunc",
            Self::MultiFunc => "multiFunc",
        }
    }
}

/// Read-only view of model status used by dispatch.
#[async_trait]
pub trait ModelStatusSource: Send + Sync {
    async fn status_of(&self, name: &str) -> Option<ModelStatus>;
}

/// A resolved backend instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// Registry key of the function record that supplied the endpoint.
    pub function_key: String,
    pub url: String,
}

pub struct Dispatcher {
    registry: Arc<dyn FunctionStore>,
    models: Arc<dyn ModelStatusSource>,
    mode: FlexMode,
    /// Registry key of this instance's own function record.
    function_name: String,
    /// Endpoint written into this instance's record on [`Dispatcher::bind`].
    local_endpoint: String,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<dyn FunctionStore>,
        models: Arc<dyn ModelStatusSource>,
        mode: FlexMode,
        function_name: impl Into<String>,
        local_endpoint: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            models,
            mode,
            function_name: function_name.into(),
            local_endpoint: local_endpoint.into(),
        }
    }

    /// Find a live endpoint serving `model`.
    pub async fn resolve(&self, model: &str) -> Result<Endpoint, DispatchError> {
        if self.models.status_of(model).await != Some(ModelStatus::Loaded) {
            tracing::debug!(model, "Model not loaded, no endpoint");
            return Err(DispatchError::NoEndpoint(model.to_string()));
        }

        let endpoint = match self.mode {
            FlexMode::SingleFunc => self
                .registry
                .get(&self.function_name, &[FunctionField::EndPoint])
                .await?
                .and_then(|record| {
                    record.live_endpoint().map(|url| Endpoint {
                        function_key: record.key.clone(),
                        url: url.to_string(),
                    })
                }),
            FlexMode::MultiFunc => self
                .registry
                .list_all(&[FunctionField::SdModel, FunctionField::EndPoint])
                .await?
                .into_iter()
                .find(|record| {
                    record.sd_model.as_deref() == Some(model) && record.live_endpoint().is_some()
                })
                .and_then(|record| {
                    record.live_endpoint().map(|url| Endpoint {
                        function_key: record.key.clone(),
                        url: url.to_string(),
                    })
                }),
        };

        endpoint.ok_or_else(|| DispatchError::NoEndpoint(model.to_string()))
    }

    /// Record a successful load in this instance's function record.
    ///
    /// Only SD checkpoints and VAEs are tracked in the registry; other model
    /// types leave it untouched.
    pub async fn bind(&self, model: &ModelAttributes) -> Result<(), DispatchError> {
        let update = match model.model_type {
            ModelType::StableDiffusion => FunctionUpdate::default().sd_model(&model.name),
            ModelType::SdVae => FunctionUpdate::default().sd_vae(&model.name),
            ModelType::Lora | ModelType::ControlNet => return Ok(()),
        };
        self.registry
            .put(&self.function_name, &update.end_point(&self.local_endpoint))
            .await?;
        tracing::info!(
            function = %self.function_name,
            model = %model.name,
            model_type = %model.model_type,
            "Function record bound",
        );
        Ok(())
    }
}
