//! Shared fakes for pipeline integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sdgate_core::model::{ModelAttributes, ModelType};
use sdgate_core::offload::OffloadCodec;
use sdgate_core::storage::{ObjectStore, StorageError};
use sdgate_db::{connect, FunctionStore, FunctionUpdate, RegistryBackend};
use sdgate_pipeline::{
    BackendError, Dispatcher, FlexMode, GenerationBackend, GenerationKind, LoadError, LoadPolicy,
    ModelLoader, ModelManager, ProxyPipeline, TaskTracker,
};
use sdgate_sdapi::messages::{ProgressResult, SdModelInfo, SdVaeInfo};
use serde_json::{json, Value};
use tokio::sync::Notify;

pub const ENDPOINT_A: &str = "http://10.0.0.1:7861";
pub const FUNCTION_NAME: &str = "sd";

// ---------------------------------------------------------------------------
// Object store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryStore {
    pub objects: Mutex<HashMap<String, Vec<u8>>>,
    pub uploads: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn insert(&self, path: &str, bytes: &[u8]) {
        self.objects.lock().unwrap().insert(path.to_string(), bytes.to_vec());
    }

    pub fn uploads(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn upload_bytes(&self, path: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
        self.uploads.lock().unwrap().push(path.to_string());
        self.objects.lock().unwrap().insert(path.to_string(), bytes);
        Ok(())
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        self.objects
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct BackendCall {
    pub endpoint: String,
    pub kind: GenerationKind,
    pub body: Value,
}

pub struct FakeBackend {
    pub calls: Mutex<Vec<BackendCall>>,
    pub reply: Mutex<Result<Value, String>>,
    /// When set, `generate` waits for a notification before replying.
    pub gate: Option<Arc<Notify>>,
    pub delay: Duration,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            reply: Mutex::new(Ok(sample_reply())),
            gate: None,
            delay: Duration::ZERO,
        }
    }
}

impl FakeBackend {
    pub fn failing(message: &str) -> Self {
        Self {
            reply: Mutex::new(Err(message.to_string())),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().unwrap().clone()
    }
}

pub fn sample_reply() -> Value {
    json!({
        "images": ["aGVsbG8="],
        "parameters": {"steps": 20},
        "info": "{}"
    })
}

#[async_trait]
impl GenerationBackend for FakeBackend {
    async fn generate(
        &self,
        endpoint: &str,
        kind: GenerationKind,
        body: &Value,
    ) -> Result<Value, BackendError> {
        self.calls.lock().unwrap().push(BackendCall {
            endpoint: endpoint.to_string(),
            kind,
            body: body.clone(),
        });
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.reply
            .lock()
            .unwrap()
            .clone()
            .map_err(BackendError::Failed)
    }

    async fn progress(&self, _endpoint: &str) -> Result<ProgressResult, BackendError> {
        Ok(ProgressResult {
            progress: 0.5,
            ..ProgressResult::default()
        })
    }

    async fn interrupt(&self, _endpoint: &str) -> Result<(), BackendError> {
        Ok(())
    }

    async fn sd_models(&self, _endpoint: &str) -> Result<Vec<SdModelInfo>, BackendError> {
        Ok(Vec::new())
    }

    async fn sd_vaes(&self, _endpoint: &str) -> Result<Vec<SdVaeInfo>, BackendError> {
        Ok(Vec::new())
    }
}

// ---------------------------------------------------------------------------
// Model loader
// ---------------------------------------------------------------------------

pub struct InstantLoader;

#[async_trait]
impl ModelLoader for InstantLoader {
    async fn load(&self, _model: &ModelAttributes) -> Result<(), LoadError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub registry: Arc<dyn FunctionStore>,
    pub models: Arc<ModelManager>,
    pub backend: Arc<FakeBackend>,
    pub tracker: Arc<TaskTracker>,
    pub dispatcher: Arc<Dispatcher>,
    pub pipeline: ProxyPipeline,
    /// Models directory the manager deletes from and scans.
    pub models_dir: tempfile::TempDir,
}

pub async fn harness(mode: FlexMode, backend: FakeBackend) -> Harness {
    let store = Arc::new(MemoryStore::default());
    let registry = connect(RegistryBackend::Sqlite, "sqlite::memory:")
        .await
        .expect("registry");
    let models_dir = tempfile::tempdir().expect("models dir");
    let models = Arc::new(ModelManager::new(
        Arc::new(InstantLoader),
        LoadPolicy::default(),
        models_dir.path(),
    ));
    let backend = Arc::new(backend);
    let tracker = Arc::new(TaskTracker::new());
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&registry),
        models.clone(),
        mode,
        FUNCTION_NAME,
        ENDPOINT_A,
    ));
    let pipeline = ProxyPipeline::new(
        Arc::clone(&tracker),
        Arc::clone(&dispatcher),
        backend.clone(),
        OffloadCodec::new(store.clone()),
    );
    Harness {
        store,
        registry,
        models,
        backend,
        tracker,
        dispatcher,
        pipeline,
        models_dir,
    }
}

impl Harness {
    /// Register and load `name`, without touching the registry.
    pub async fn load_model(&self, name: &str) {
        self.models
            .register(ModelType::StableDiffusion, name)
            .await
            .expect("register");
        self.models.load(name).await.expect("load");
    }

    /// Bind `model` to `endpoint` under `key` in the registry.
    pub async fn bind(&self, key: &str, model: &str, endpoint: &str) {
        self.registry
            .put(
                key,
                &FunctionUpdate::default().sd_model(model).end_point(endpoint),
            )
            .await
            .expect("put");
    }
}
