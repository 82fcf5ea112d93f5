//! Caller identity extractor for Axum handlers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use sdgate_core::error::CoreError;

use crate::error::AppError;
use crate::state::AppState;

/// Header carrying the caller's user name.
pub const USERNAME_HEADER: &str = "username";

/// User name recorded on tasks and offloaded images when login is off.
pub const DEFAULT_USER: &str = "default";

/// The user a request is made on behalf of.
///
/// With `LOGIN_SWITCH=on` the `username` header is required and requests
/// without it are rejected with 401. Otherwise the header is optional and
/// missing values fall back to [`DEFAULT_USER`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestUser {
    pub name: String,
}

impl FromRequestParts<AppState> for RequestUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(USERNAME_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        match header {
            Some(name) => Ok(RequestUser {
                name: name.to_string(),
            }),
            None if state.config.login_switch => Err(AppError::Core(CoreError::Unauthorized(
                "Missing username header".into(),
            ))),
            None => Ok(RequestUser {
                name: DEFAULT_USER.to_string(),
            }),
        }
    }
}
