//! Request extractors shared by handlers.
//!
//! - [`auth::RequestUser`] -- Identifies the calling user from the `username` header.

pub mod auth;
