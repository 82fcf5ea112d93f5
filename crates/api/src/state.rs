use std::sync::Arc;

use sdgate_db::FunctionStore;
use sdgate_pipeline::{Dispatcher, GenerationBackend, ModelManager, ProxyPipeline, TaskTracker};

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable: every component is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Function registry selected by `DB_TYPE`.
    pub registry: Arc<dyn FunctionStore>,
    pub tracker: Arc<TaskTracker>,
    pub models: Arc<ModelManager>,
    pub dispatcher: Arc<Dispatcher>,
    pub pipeline: Arc<ProxyPipeline>,
    /// Client for the local WebUI at `config.downstream`.
    pub backend: Arc<dyn GenerationBackend>,
}
