//! Model lifecycle manager.
//!
//! Tracks every model known to this instance and drives its status through
//! the [`ModelStatus`] transition table. A model is identified by its type
//! and file name, so `Lora/anime.safetensors` and
//! `Stable-diffusion/anime.safetensors` are separate models. Loads are gated
//! by a semaphore so at most `LoadPolicy::permits()` cold starts run at once;
//! callers wait for a permit rather than fail.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use sdgate_core::model::{is_model_file, ModelAttributes, ModelStatus, ModelType};
use tokio::sync::{RwLock, Semaphore};

use crate::dispatcher::ModelStatusSource;
use crate::loader::{model_file_path, ModelLoader};

/// Default number of concurrent cold starts.
pub const DEFAULT_COLD_START_CONCURRENCY: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model not found: {0}")]
    NotFound(String),

    #[error("model already registered: {0}")]
    AlreadyExists(String),

    #[error("invalid model name: {0}")]
    InvalidName(String),

    /// A bare name matched models of several types, none a checkpoint.
    #[error("model name {0} is used by several model types; specify the type")]
    Ambiguous(String),

    #[error("model {0} is already loading")]
    AlreadyLoading(String),

    #[error("invalid model transition for {name}: {from} -> {to}")]
    InvalidTransition {
        name: String,
        from: ModelStatus,
        to: ModelStatus,
    },

    /// The loader failed; the model was rolled back to `registering`.
    #[error("endpoint not ready: loading {name} failed: {reason}")]
    LoadFailed { name: String, reason: String },

    /// A resident model's file is no longer on disk.
    #[error("model not exist: {0}")]
    FileMissing(String),

    #[error("delete model fail: {name}: {reason}")]
    DeleteFailed { name: String, reason: String },

    #[error("model discovery failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Cold-start concurrency settings.
#[derive(Debug, Clone, Copy)]
pub struct LoadPolicy {
    pub cold_start_concurrency: usize,
    /// Load one model at a time regardless of `cold_start_concurrency`.
    pub serial: bool,
}

impl Default for LoadPolicy {
    fn default() -> Self {
        Self {
            cold_start_concurrency: DEFAULT_COLD_START_CONCURRENCY,
            serial: false,
        }
    }
}

impl LoadPolicy {
    pub fn permits(&self) -> usize {
        if self.serial {
            1
        } else {
            self.cold_start_concurrency.max(1)
        }
    }
}

/// Names a model, optionally narrowed to one type.
///
/// A bare name resolves to the only live model with that name. When several
/// types share the name the checkpoint wins, otherwise the name is
/// [`ModelError::Ambiguous`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelRef<'a> {
    pub name: &'a str,
    pub model_type: Option<ModelType>,
}

impl<'a> ModelRef<'a> {
    pub fn typed(model_type: ModelType, name: &'a str) -> Self {
        Self {
            name,
            model_type: Some(model_type),
        }
    }
}

impl<'a> From<&'a str> for ModelRef<'a> {
    fn from(name: &'a str) -> Self {
        Self {
            name,
            model_type: None,
        }
    }
}

impl<'a> From<&'a String> for ModelRef<'a> {
    fn from(name: &'a String) -> Self {
        Self::from(name.as_str())
    }
}

/// Outcome of a model directory scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Discovery {
    /// Files recorded as `loaded` that were unknown or deleted before.
    pub added: usize,
    /// Resident models whose file is gone, now marked `deleted`.
    pub vanished: usize,
}

type ModelKey = (ModelType, String);
type Inventory = HashMap<ModelKey, ModelAttributes>;

pub struct ModelManager {
    models: RwLock<Inventory>,
    loader: Arc<dyn ModelLoader>,
    load_permits: Semaphore,
    models_dir: PathBuf,
}

impl ModelManager {
    /// `models_dir` holds one sub-directory per [`ModelType::dir_name`].
    pub fn new(loader: Arc<dyn ModelLoader>, policy: LoadPolicy, models_dir: impl Into<PathBuf>) -> Self {
        Self {
            models: RwLock::new(HashMap::new()),
            loader,
            load_permits: Semaphore::new(policy.permits()),
            models_dir: models_dir.into(),
        }
    }

    /// Declare a model. It starts in `registering`.
    ///
    /// A model previously marked deleted may be registered again. The same
    /// name may be registered once per model type.
    pub async fn register(&self, model_type: ModelType, name: &str) -> Result<ModelAttributes, ModelError> {
        validate_name(name)?;
        let key = (model_type, name.to_string());
        let mut models = self.models.write().await;
        if let Some(existing) = models.get(&key) {
            if existing.status != ModelStatus::Deleted {
                return Err(ModelError::AlreadyExists(name.to_string()));
            }
        }
        let attrs = ModelAttributes::new(model_type, name, ModelStatus::Registering);
        models.insert(key, attrs.clone());
        tracing::info!(model = %name, model_type = %model_type, "Model registered");
        Ok(attrs)
    }

    /// Make a model resident on the backend.
    ///
    /// Loaded models return immediately. On loader failure the model rolls
    /// back to `registering` and [`ModelError::LoadFailed`] is returned.
    pub async fn load<'a>(&self, model: impl Into<ModelRef<'a>>) -> Result<ModelAttributes, ModelError> {
        let (key, attrs) = {
            let mut models = self.models.write().await;
            let key = resolve_key(&models, model.into())?;
            let entry = models
                .get_mut(&key)
                .ok_or_else(|| ModelError::NotFound(key.1.clone()))?;
            match entry.status {
                ModelStatus::Loaded => return Ok(entry.clone()),
                ModelStatus::Loading => return Err(ModelError::AlreadyLoading(key.1.clone())),
                _ => transition(entry, ModelStatus::Loading)?,
            }
            let attrs = entry.clone();
            (key, attrs)
        };
        let name = attrs.name.as_str();

        let outcome = match self.load_permits.acquire().await {
            Ok(_permit) => self.loader.load(&attrs).await.map_err(|e| e.to_string()),
            Err(_) => Err("load queue closed".to_string()),
        };

        let mut models = self.models.write().await;
        let entry = models
            .get_mut(&key)
            .ok_or_else(|| ModelError::NotFound(name.to_string()))?;
        // Removed while the loader ran.
        if entry.status != ModelStatus::Loading {
            return Err(ModelError::InvalidTransition {
                name: name.to_string(),
                from: entry.status,
                to: ModelStatus::Loaded,
            });
        }

        match outcome {
            Ok(()) => {
                transition(entry, ModelStatus::Loaded)?;
                tracing::info!(model = %name, model_type = %attrs.model_type, "Model loaded");
                Ok(entry.clone())
            }
            Err(reason) => {
                transition(entry, ModelStatus::Registering)?;
                tracing::warn!(model = %name, error = %reason, "Model load failed, rolled back");
                Err(ModelError::LoadFailed {
                    name: name.to_string(),
                    reason,
                })
            }
        }
    }

    pub async fn unload<'a>(&self, model: impl Into<ModelRef<'a>>) -> Result<ModelAttributes, ModelError> {
        let mut models = self.models.write().await;
        let entry = entry_mut(&mut models, model.into())?;
        transition(entry, ModelStatus::Unloaded)?;
        tracing::info!(model = %entry.name, model_type = %entry.model_type, "Model unloaded");
        Ok(entry.clone())
    }

    /// Delete a model's file from the models directory and mark it deleted.
    ///
    /// A `loaded` or `unloaded` model must still have its file, otherwise
    /// [`ModelError::FileMissing`] is returned and the record is unchanged.
    /// Models that never became resident may have no file.
    pub async fn remove<'a>(&self, model: impl Into<ModelRef<'a>>) -> Result<ModelAttributes, ModelError> {
        let mut models = self.models.write().await;
        let entry = entry_mut(&mut models, model.into())?;
        if !entry.status.can_transition(ModelStatus::Deleted) {
            return Err(ModelError::InvalidTransition {
                name: entry.name.clone(),
                from: entry.status,
                to: ModelStatus::Deleted,
            });
        }

        let path = model_file_path(&self.models_dir, entry);
        let resident = matches!(entry.status, ModelStatus::Loaded | ModelStatus::Unloaded);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                tracing::info!(model = %entry.name, path = %path.display(), "Model file deleted");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !resident => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ModelError::FileMissing(path.display().to_string()));
            }
            Err(e) => {
                return Err(ModelError::DeleteFailed {
                    name: entry.name.clone(),
                    reason: e.to_string(),
                });
            }
        }

        transition(entry, ModelStatus::Deleted)?;
        tracing::info!(model = %entry.name, model_type = %entry.model_type, "Model deleted");
        Ok(entry.clone())
    }

    /// Live models sorted by name then type, optionally only those of
    /// `model_type`.
    pub async fn list_by_type(&self, model_type: Option<ModelType>) -> Vec<ModelAttributes> {
        let models = self.models.read().await;
        let mut listed: Vec<ModelAttributes> = models
            .values()
            .filter(|m| m.status != ModelStatus::Deleted)
            .filter(|m| model_type.map_or(true, |t| m.model_type == t))
            .cloned()
            .collect();
        listed.sort_by(|a, b| {
            a.name
                .cmp(&b.name)
                .then_with(|| a.model_type.as_str().cmp(b.model_type.as_str()))
        });
        listed
    }

    /// Status of the model `model` resolves to. Unknown and ambiguous names
    /// have none.
    pub async fn status_of<'a>(&self, model: impl Into<ModelRef<'a>>) -> Option<ModelStatus> {
        let models = self.models.read().await;
        let key = resolve_key(&models, model.into()).ok()?;
        models.get(&key).map(|m| m.status)
    }

    pub async fn get<'a>(&self, model: impl Into<ModelRef<'a>>) -> Result<ModelAttributes, ModelError> {
        let models = self.models.read().await;
        let model = model.into();
        let key = resolve_key(&models, model)?;
        models
            .get(&key)
            .cloned()
            .ok_or_else(|| ModelError::NotFound(model.name.to_string()))
    }

    /// Scan `{models_dir}/{type dir}` and bring the inventory in line with
    /// the files on disk.
    ///
    /// Model files that are unknown, or known only as deleted, are recorded
    /// as `loaded`. Loaded and unloaded models whose file is gone are marked
    /// `deleted`. Models still registering or loading are left alone.
    /// Missing type directories count as empty.
    pub async fn discover(&self) -> Result<Discovery, ModelError> {
        let mut found = HashSet::new();
        for model_type in ModelType::ALL {
            let dir = self.models_dir.join(model_type.dir_name());
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                if !entry.file_type().await?.is_file() {
                    continue;
                }
                let file_name = entry.file_name().to_string_lossy().into_owned();
                if is_model_file(&file_name) {
                    found.insert((model_type, file_name));
                }
            }
        }

        let mut models = self.models.write().await;
        let mut summary = Discovery::default();
        for (key, attrs) in models.iter_mut() {
            let resident = matches!(attrs.status, ModelStatus::Loaded | ModelStatus::Unloaded);
            if resident && !found.contains(key) {
                transition(attrs, ModelStatus::Deleted)?;
                tracing::warn!(model = %attrs.name, model_type = %attrs.model_type, "Model file vanished, marked deleted");
                summary.vanished += 1;
            }
        }
        for key in found {
            let known = models
                .get(&key)
                .is_some_and(|m| m.status != ModelStatus::Deleted);
            if !known {
                let attrs = ModelAttributes::new(key.0, &key.1, ModelStatus::Loaded);
                models.insert(key, attrs);
                summary.added += 1;
            }
        }
        tracing::info!(
            dir = %self.models_dir.display(),
            added = summary.added,
            vanished = summary.vanished,
            "Model discovery complete"
        );
        Ok(summary)
    }
}

fn resolve_key(models: &Inventory, model: ModelRef<'_>) -> Result<ModelKey, ModelError> {
    let types: &[ModelType] = match &model.model_type {
        Some(t) => std::slice::from_ref(t),
        None => &ModelType::ALL,
    };
    let candidates: Vec<&ModelAttributes> = types
        .iter()
        .filter_map(|t| models.get(&(*t, model.name.to_string())))
        .collect();
    let live: Vec<&ModelAttributes> = candidates
        .iter()
        .copied()
        .filter(|m| m.status != ModelStatus::Deleted)
        .collect();
    let pool = if live.is_empty() { candidates } else { live };

    let chosen = match pool.as_slice() {
        [] => return Err(ModelError::NotFound(model.name.to_string())),
        [only] => *only,
        several => several
            .iter()
            .copied()
            .find(|m| m.model_type == ModelType::StableDiffusion)
            .ok_or_else(|| ModelError::Ambiguous(model.name.to_string()))?,
    };
    Ok((chosen.model_type, chosen.name.clone()))
}

fn entry_mut<'m>(models: &'m mut Inventory, model: ModelRef<'_>) -> Result<&'m mut ModelAttributes, ModelError> {
    let key = resolve_key(models, model)?;
    models
        .get_mut(&key)
        .ok_or_else(|| ModelError::NotFound(model.name.to_string()))
}

fn transition(entry: &mut ModelAttributes, to: ModelStatus) -> Result<(), ModelError> {
    if !entry.status.can_transition(to) {
        return Err(ModelError::InvalidTransition {
            name: entry.name.clone(),
            from: entry.status,
            to,
        });
    }
    entry.status = to;
    Ok(())
}

/// Model names are bare file names inside a typed model directory.
fn validate_name(name: &str) -> Result<(), ModelError> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(ModelError::InvalidName(name.to_string()));
    }
    Ok(())
}

#[async_trait]
impl ModelStatusSource for ModelManager {
    async fn status_of(&self, name: &str) -> Option<ModelStatus> {
        ModelManager::status_of(self, name).await
    }
}
