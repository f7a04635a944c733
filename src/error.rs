//! Error taxonomy shared by every cache subsystem.
//!
//! Errors are `Clone` because a single in-flight fetch hands the same outcome to
//! every caller waiting on it (see [`crate::singleflight`]). Each variant maps to a
//! stable machine-readable code and an HTTP status for the server boundary.

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    /// Empty key or name, malformed request.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Absent key on delete, unresolvable ring lookup, unknown cache node.
    #[error("not found: {0}")]
    NotFound(String),

    /// Duplicate node registration or a second peer picker on one node.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Peer RPC failure or heartbeat timeout.
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// Store accounting inconsistency. Always a bug.
    #[error("internal error: {0}")]
    Internal(String),

    /// The caller-supplied origin loader failed.
    #[error("loader failed: {0}")]
    Loader(String),
}

pub type Result<T, E = CacheError> = std::result::Result<T, E>;

impl CacheError {
    /// Stable identifier, part of the HTTP error body.
    pub fn code(&self) -> &'static str {
        match self {
            CacheError::InvalidArgument(_) => "invalid_argument",
            CacheError::NotFound(_) => "not_found",
            CacheError::AlreadyExists(_) => "already_exists",
            CacheError::Unavailable(_) => "unavailable",
            CacheError::Internal(_) => "internal",
            CacheError::Loader(_) => "loader_failed",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            CacheError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::AlreadyExists(_) => StatusCode::CONFLICT,
            CacheError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            CacheError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            CacheError::Loader(_) => StatusCode::BAD_GATEWAY,
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        CacheError::InvalidArgument(message.into())
    }

    pub fn unavailable(message: impl std::fmt::Display) -> Self {
        CacheError::Unavailable(message.to_string())
    }
}

/// JSON body returned by the HTTP layer for every failed request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl From<&CacheError> for ErrorBody {
    fn from(err: &CacheError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}
