//! Request handlers for the control-plane API.
//!
//! Each submodule serves one resource. Handlers delegate to the pipeline
//! components held in [`AppState`](crate::state::AppState) and map errors
//! via [`AppError`](crate::error::AppError).

pub mod backend;
pub mod functions;
pub mod generation;
pub mod models;
pub mod tasks;
