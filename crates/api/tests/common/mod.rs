//! Shared helpers for API integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use sdgate_api::config::ServerConfig;
use sdgate_api::router::build_app_router;
use sdgate_api::state::AppState;
use sdgate_core::model::{ModelAttributes, ModelType};
use sdgate_core::offload::OffloadCodec;
use sdgate_core::storage::{ObjectStore, StorageError};
use sdgate_db::{connect, FunctionUpdate, RegistryBackend};
use sdgate_pipeline::{
    BackendError, Dispatcher, GenerationBackend, GenerationKind, LoadError, LoadPolicy,
    ModelLoader, ModelManager, ProxyPipeline, TaskTracker,
};
use sdgate_sdapi::messages::{ProgressResult, SdModelInfo, SdVaeInfo};
use serde_json::{json, Value};
use tower::ServiceExt;

pub const MODEL: &str = "v1-5-pruned.safetensors";

/// Build a test `ServerConfig` from the defaults with a short request
/// timeout. The downstream endpoint doubles as this instance's endpoint.
pub fn test_config() -> ServerConfig {
    let mut config = ServerConfig::from_lookup(|_| None).expect("default config");
    config.host = "127.0.0.1".to_string();
    config.port = 0;
    config.downstream = "http://10.0.0.1:7861".to_string();
    config.request_timeout_secs = 30;
    config
}

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn upload_bytes(&self, path: &str, bytes: Vec<u8>) -> Result<(), StorageError> {
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

pub struct FakeBackend {
    pub reply: Result<Value, String>,
    pub delay: Duration,
    pub calls: Mutex<Vec<(String, GenerationKind)>>,
    /// Endpoints that received an interrupt.
    pub interrupts: Mutex<Vec<String>>,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self {
            reply: Ok(json!({"images": ["aGVsbG8="], "parameters": {}, "info": "{}"})),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            interrupts: Mutex::new(Vec::new()),
        }
    }
}

impl FakeBackend {
    pub fn calls(&self) -> Vec<(String, GenerationKind)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationBackend for FakeBackend {
    async fn generate(
        &self,
        endpoint: &str,
        kind: GenerationKind,
        _body: &Value,
    ) -> Result<Value, BackendError> {
        self.calls.lock().unwrap().push((endpoint.to_string(), kind));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.reply.clone().map_err(BackendError::Failed)
    }

    async fn progress(&self, _endpoint: &str) -> Result<ProgressResult, BackendError> {
        Ok(ProgressResult {
            progress: 0.25,
            ..ProgressResult::default()
        })
    }

    async fn interrupt(&self, endpoint: &str) -> Result<(), BackendError> {
        self.interrupts.lock().unwrap().push(endpoint.to_string());
        Ok(())
    }

    async fn sd_models(&self, _endpoint: &str) -> Result<Vec<SdModelInfo>, BackendError> {
        Ok(vec![SdModelInfo {
            title: format!("{MODEL} [6ce0161689]"),
            model_name: "v1-5-pruned".to_string(),
            hash: Some("6ce0161689".to_string()),
            sha256: None,
            filename: format!("/mnt/auto/sd/models/Stable-diffusion/{MODEL}"),
        }])
    }

    async fn sd_vaes(&self, _endpoint: &str) -> Result<Vec<SdVaeInfo>, BackendError> {
        Err(BackendError::Failed("vae listing unavailable".to_string()))
    }
}

/// Loads every model except those whose name starts with `broken`.
pub struct TestLoader;

#[async_trait]
impl ModelLoader for TestLoader {
    async fn load(&self, model: &ModelAttributes) -> Result<(), LoadError> {
        if model.name.starts_with("broken") {
            return Err(LoadError::Storage(StorageError::NotFound(
                model.storage_path(),
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub backend: Arc<FakeBackend>,
    /// Models directory behind `state.models`.
    pub models_dir: tempfile::TempDir,
}

/// Build the full application router over an in-memory registry and fakes.
pub async fn build_test_app(config: ServerConfig, backend: FakeBackend) -> TestApp {
    let registry = connect(RegistryBackend::Sqlite, "sqlite::memory:")
        .await
        .expect("registry");
    let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::default());
    let models_dir = tempfile::tempdir().expect("models dir");
    let models = Arc::new(ModelManager::new(
        Arc::new(TestLoader),
        LoadPolicy::default(),
        models_dir.path(),
    ));
    let backend = Arc::new(backend);
    let tracker = Arc::new(TaskTracker::new());
    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&registry),
        models.clone(),
        config.flex_mode,
        config.function_name.clone(),
        config.downstream.clone(),
    ));
    let pipeline = Arc::new(
        ProxyPipeline::new(
            Arc::clone(&tracker),
            Arc::clone(&dispatcher),
            backend.clone(),
            OffloadCodec::new(Arc::clone(&store)),
        )
        .with_sync_timeout(Duration::from_secs(5)),
    );

    let state = AppState {
        config: Arc::new(config.clone()),
        registry,
        tracker,
        models,
        dispatcher,
        pipeline,
        backend: backend.clone(),
    };

    TestApp {
        router: build_app_router(state.clone(), &config),
        state,
        backend,
        models_dir,
    }
}

impl TestApp {
    /// Register and load `name` locally and bind it in the registry under
    /// this instance's function name, as a successful load does.
    pub async fn serve_model(&self, name: &str) {
        self.state
            .models
            .register(ModelType::StableDiffusion, name)
            .await
            .expect("register");
        self.state.models.load(name).await.expect("load");
        self.state
            .registry
            .put(
                &self.state.config.function_name,
                &FunctionUpdate::default()
                    .sd_model(name)
                    .end_point(&self.state.config.downstream),
            )
            .await
            .expect("bind");
    }

    /// Write a model file where the backend would keep it.
    pub fn put_model_file(&self, model_type: ModelType, name: &str) -> PathBuf {
        let dir = self.models_dir.path().join(model_type.dir_name());
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        std::fs::write(&path, b"weights").unwrap();
        path
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        (status, headers, body_json(response.into_body()).await)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, HeaderMap, Value) {
        self.send(Request::get(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post_json(
        &self,
        uri: &str,
        body: &Value,
        headers: &[(&str, &str)],
    ) -> (StatusCode, HeaderMap, Value) {
        self.send(json_request("POST", uri, body, headers)).await
    }

    pub async fn put_json(&self, uri: &str, body: &Value) -> (StatusCode, HeaderMap, Value) {
        self.send(json_request("PUT", uri, body, &[])).await
    }

    pub async fn delete(&self, uri: &str) -> StatusCode {
        let (status, _, _) = self
            .send(Request::delete(uri).body(Body::empty()).unwrap())
            .await;
        status
    }
}

pub fn json_request(
    method: &str,
    uri: &str,
    body: &Value,
    headers: &[(&str, &str)],
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// Collect a response body as JSON. Empty bodies become `Value::Null`.
pub async fn body_json(body: Body) -> Value {
    let bytes = body.collect().await.unwrap().to_bytes();
    if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    }
}

pub fn generation_body(model: &str) -> Value {
    json!({
        "stable_diffusion_model": model,
        "prompt": "a lighthouse at dusk",
        "steps": 20
    })
}
