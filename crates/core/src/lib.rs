//! Domain types shared by every sdgate crate.
//!
//! Holds the task and model state machines, the object-storage capability
//! trait and the payload offload codec. Nothing in here talks HTTP or SQL.

pub mod error;
pub mod model;
pub mod offload;
pub mod storage;
pub mod task;
pub mod types;
