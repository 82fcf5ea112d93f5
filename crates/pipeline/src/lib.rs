//! Request pipeline for the control plane.
//!
//! Composes the task tracker, model lifecycle manager, dispatcher and
//! generation backend into the per-request flow: resolve an endpoint,
//! offload the payload, call the backend, restore the response and record
//! the terminal task status.

pub mod backend;
pub mod dispatcher;
pub mod loader;
pub mod models;
pub mod proxy;
pub mod tracker;

pub use backend::{BackendError, GenerationBackend, GenerationKind, SdBackend};
pub use dispatcher::{DispatchError, Dispatcher, Endpoint, FlexMode, ModelStatusSource};
pub use loader::{BackendModelLoader, LoadError, ModelLoader};
pub use models::{Discovery, LoadPolicy, ModelError, ModelManager, ModelRef};
pub use proxy::{GenerationRequest, InvocationMode, PipelineError, ProxyPipeline, SubmitOutcome};
pub use tracker::{TaskError, TaskTracker};
