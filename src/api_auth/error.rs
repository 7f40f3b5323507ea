//! Authentication error types.
//!
//! Configuration problems are raised once, at construction. Per-request
//! rejections are never errors: they travel as a negative [`Verdict`].
//! What remains here is infrastructure failure and its HTTP mapping.
//!
//! [`Verdict`]: super::gate::Verdict

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Fatal configuration errors. Never produced per request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("No secret configured")]
    MissingSecret,

    #[error("Expiry must be between 1 second and one year")]
    InvalidExpiry,

    #[error("Invalid header name: {0}")]
    InvalidHeaderName(String),

    #[error("A replay store is required when request identifiers are required")]
    MissingReplayStore,

    #[error("Failed to read config file {path}: {message}")]
    Read { path: String, message: String },

    #[error("Failed to parse config: {0}")]
    Parse(String),
}

/// Replay store failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Replay store unavailable: {0}")]
    Unavailable(String),
}

/// Per-request infrastructure failure raised by the gate.
///
/// Distinct from a rejection: the request could not be judged at all.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GateError {
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// HTTP-facing error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum AuthErrorCode {
    /// 4000: Request body could not be read
    BodyUnreadable = 4000,
    /// 4030: Request is not authentic (any reason)
    Forbidden = 4030,
    /// 5030: Replay store unavailable
    StoreUnavailable = 5030,
}

impl AuthErrorCode {
    /// Get error code as i32.
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Get error name string.
    pub fn name(self) -> &'static str {
        match self {
            Self::BodyUnreadable => "BODY_UNREADABLE",
            Self::Forbidden => "FORBIDDEN",
            Self::StoreUnavailable => "SERVICE_UNAVAILABLE",
        }
    }

    /// Get HTTP status code.
    pub fn http_status(self) -> StatusCode {
        match self {
            Self::BodyUnreadable => StatusCode::BAD_REQUEST,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Authentication error with message.
#[derive(Debug, Clone)]
pub struct AuthError {
    pub code: AuthErrorCode,
    pub message: String,
}

impl AuthError {
    /// Create a new auth error.
    pub fn new(code: AuthErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Create error with default message.
    ///
    /// `Forbidden` carries the same text whatever check failed.
    pub fn from_code(code: AuthErrorCode) -> Self {
        let message = match code {
            AuthErrorCode::BodyUnreadable => "Request body could not be read",
            AuthErrorCode::Forbidden => "Access to this resource has been restricted",
            AuthErrorCode::StoreUnavailable => "Service temporarily unavailable",
        };
        Self::new(code, message)
    }
}

impl From<GateError> for AuthError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::Store(_) => Self::from_code(AuthErrorCode::StoreUnavailable),
        }
    }
}

/// JSON response body for auth errors.
#[derive(Debug, Serialize)]
pub struct AuthErrorResponse {
    pub code: i32,
    pub error: &'static str,
    pub message: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let body = AuthErrorResponse {
            code: self.code.code(),
            error: self.code.name(),
            message: self.message,
        };
        (self.code.http_status(), Json(body)).into_response()
    }
}
