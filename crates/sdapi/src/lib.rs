//! REST client for a Stable Diffusion WebUI backend instance.
//!
//! Typed wrappers over the `/sdapi/v1/*` and `/controlnet/*` endpoints the
//! control plane calls during model loading, generation and progress polling.

pub mod api;
pub mod messages;

pub use api::{SdApi, SdApiError};
