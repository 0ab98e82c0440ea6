// SPDX-License-Identifier: MIT OR Apache-2.0
//! Server and API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use bastion_vault::VaultError;

/// Server startup/configuration error.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ServerError {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Vault engine error.
    #[error("vault error: {0}")]
    Vault(#[from] VaultError),
}

/// Result type alias for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// JSON error body returned to API clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Stable machine-readable error kind.
    pub status: String,
    /// HTTP status code.
    pub code: u16,
    /// Human-readable message.
    pub message: String,
}

impl ApiError {
    #[must_use]
    pub fn new(status: impl Into<String>, code: u16, message: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            code,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("bad_request", 400, message)
    }

    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("not_found", 404, message)
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new("internal_error", 500, message)
    }
}

impl From<VaultError> for ApiError {
    fn from(err: VaultError) -> Self {
        let code = match &err {
            VaultError::Sealed | VaultError::Uninitialized => 503,
            VaultError::NotFound | VaultError::VersionNotFound => 404,
            VaultError::AlreadyInitialized
            | VaultError::InvalidShare
            | VaultError::MountExists(_)
            | VaultError::UnknownMountType(_)
            | VaultError::BadConfig(_)
            | VaultError::PathContainsDot
            | VaultError::CasMismatch
            | VaultError::Cancelled => 400,
            _ => 500,
        };
        Self::new(err.kind(), code, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
