//! Function registry persistence.
//!
//! A function record binds a logical backend identity to the SD model and
//! VAE it currently has loaded and the endpoint it is reachable at. The
//! [`FunctionStore`] trait is implemented for an embedded SQLite database
//! (single control instance) and for PostgreSQL (shared by several control
//! instances). The backend is chosen once at startup via [`connect`].

pub mod models;
pub mod postgres;
pub mod sqlite;
pub mod store;

pub use models::function::{FunctionField, FunctionRecord, FunctionUpdate};
pub use postgres::PgFunctionStore;
pub use sqlite::SqliteFunctionStore;
pub use store::{connect, FunctionStore, RegistryBackend, RegistryError};
