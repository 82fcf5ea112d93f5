//! Model inventory types and the model status state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// File extensions recognised as model weights.
pub const MODEL_FILE_EXTENSIONS: &[&str] = &[".pt", ".ckpt", ".safetensors", ".pth"];

/// Whether `file_name` looks like a model weights file.
pub fn is_model_file(file_name: &str) -> bool {
    MODEL_FILE_EXTENSIONS
        .iter()
        .any(|ext| file_name.ends_with(ext))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModelType {
    StableDiffusion,
    SdVae,
    Lora,
    ControlNet,
}

impl ModelType {
    pub const ALL: [ModelType; 4] = [
        Self::StableDiffusion,
        Self::SdVae,
        Self::Lora,
        Self::ControlNet,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::StableDiffusion => "stableDiffusion",
            Self::SdVae => "sdVae",
            Self::Lora => "lora",
            Self::ControlNet => "controlNet",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, CoreError> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == name)
            .ok_or_else(|| CoreError::Validation(format!("modeltype: {name} not support")))
    }

    /// Subdirectory of the backend's `models/` directory holding this type.
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::StableDiffusion => "Stable-diffusion",
            Self::SdVae => "VAE",
            Self::Lora => "Lora",
            Self::ControlNet => "ControlNet",
        }
    }

    pub fn from_dir_name(dir: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.dir_name() == dir)
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
    Registering,
    Loading,
    Loaded,
    Unloaded,
    Deleted,
}

impl ModelStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Registering => "registering",
            Self::Loading => "loading",
            Self::Loaded => "loaded",
            Self::Unloaded => "unloaded",
            Self::Deleted => "deleted",
        }
    }

    /// Statuses reachable from `self` in one step.
    ///
    /// `Loading -> Registering` is the rollback taken by a failed load.
    pub fn valid_transitions(self) -> &'static [ModelStatus] {
        match self {
            Self::Registering => &[Self::Loading, Self::Deleted],
            Self::Loading => &[Self::Loaded, Self::Registering, Self::Deleted],
            Self::Loaded => &[Self::Unloaded, Self::Deleted],
            Self::Unloaded => &[Self::Loading, Self::Deleted],
            Self::Deleted => &[],
        }
    }

    pub fn can_transition(self, to: ModelStatus) -> bool {
        self.valid_transitions().contains(&to)
    }
}

impl fmt::Display for ModelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A model file known to the instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelAttributes {
    #[serde(rename = "type")]
    pub model_type: ModelType,
    pub name: String,
    pub status: ModelStatus,
}

impl ModelAttributes {
    pub fn new(model_type: ModelType, name: &str, status: ModelStatus) -> Self {
        Self {
            model_type,
            name: name.to_string(),
            status,
        }
    }

    /// Object-storage path the model file is fetched from when loading.
    pub fn storage_path(&self) -> String {
        format!("models/{}/{}", self.model_type.dir_name(), self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognises_model_extensions() {
        assert!(is_model_file("v1-5-pruned.safetensors"));
        assert!(is_model_file("vae.pt"));
        assert!(is_model_file("model.ckpt"));
        assert!(is_model_file("control_canny.pth"));
        assert!(!is_model_file("readme.txt"));
        assert!(!is_model_file("image.png"));
    }

    #[test]
    fn model_type_round_trips_through_dir_name() {
        for t in ModelType::ALL {
            assert_eq!(ModelType::from_dir_name(t.dir_name()), Some(t));
        }
        assert_eq!(ModelType::from_dir_name("embeddings"), None);
    }

    #[test]
    fn model_type_from_name_rejects_unknown() {
        assert_eq!(ModelType::from_name("sdVae").unwrap(), ModelType::SdVae);
        assert!(ModelType::from_name("hypernetwork").is_err());
    }

    #[test]
    fn registering_cannot_skip_loading() {
        assert!(!ModelStatus::Registering.can_transition(ModelStatus::Loaded));
        assert!(ModelStatus::Registering.can_transition(ModelStatus::Loading));
    }

    #[test]
    fn failed_load_rolls_back_to_registering() {
        assert!(ModelStatus::Loading.can_transition(ModelStatus::Registering));
        assert!(ModelStatus::Loading.can_transition(ModelStatus::Loaded));
    }

    #[test]
    fn unloaded_and_deleted_reachable_from_loaded() {
        assert!(ModelStatus::Loaded.can_transition(ModelStatus::Unloaded));
        assert!(ModelStatus::Loaded.can_transition(ModelStatus::Deleted));
        assert!(!ModelStatus::Loaded.can_transition(ModelStatus::Loading));
    }

    #[test]
    fn deleted_is_final() {
        assert!(ModelStatus::Deleted.valid_transitions().is_empty());
    }

    #[test]
    fn attributes_serialize_with_type_key() {
        let attrs = ModelAttributes::new(ModelType::ControlNet, "canny.pth", ModelStatus::Loaded);
        let json = serde_json::to_value(&attrs).unwrap();
        assert_eq!(json["type"], "controlNet");
        assert_eq!(json["status"], "loaded");
        assert_eq!(attrs.storage_path(), "models/ControlNet/canny.pth");
    }
}
