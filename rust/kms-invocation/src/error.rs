//! The rejection a service answers failed invocations with.
//!
//! Verification failures are logged with their precise cause but reported to
//! the caller as a single, uniform rejection that does not reveal
//! which check failed.

use crate::verify::VerificationError;
use serde::Serialize;
use thiserror::Error;

/// Error codes a KMS returns for invocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// The invocation was not authorized.
    Unauthorized,
}

impl ErrorCode {
    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorCode::Unauthorized => 401,
        }
    }
}

/// A rejected invocation, ready to be turned into an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("{code:?}: {message}")]
pub struct Rejection {
    /// Error classification.
    pub code: ErrorCode,
    /// Human readable message.
    pub message: String,
}

impl Rejection {
    /// The invocation was not authorized.
    pub fn unauthorized() -> Self {
        Self {
            code: ErrorCode::Unauthorized,
            message: "unauthorized".to_string(),
        }
    }

    /// HTTP status code for this rejection.
    pub fn status_code(&self) -> u16 {
        self.code.status_code()
    }
}

impl From<VerificationError> for Rejection {
    fn from(_: VerificationError) -> Self {
        Rejection::unauthorized()
    }
}
