use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the throttler.
///
/// Only the bounded-wait operations return [`ThrottlerError::WaitLimitExceeded`];
/// the remaining variants come from building limiters out of configuration.
#[derive(Debug, Error)]
pub enum ThrottlerError {
    #[error("wait time {predicted:?} exceeds limit {limit:?}")]
    WaitLimitExceeded { predicted: Duration, limit: Duration },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse configuration: {0}")]
    Json(#[from] serde_json::Error),
}

pub type ThrottlerResult<T> = Result<T, ThrottlerError>;

impl ThrottlerError {
    /// True when the caller may retry later without changing anything.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ThrottlerError::WaitLimitExceeded { .. })
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
        }
    }

    pub fn from_error(err: &ThrottlerError) -> Self {
        let kind = match err {
            ThrottlerError::WaitLimitExceeded { .. } => "wait_limit_exceeded",
            ThrottlerError::Configuration(_) => "configuration_error",
            ThrottlerError::Validation(_) => "validation_error",
            ThrottlerError::Io(_) => "io_error",
            ThrottlerError::Json(_) => "parse_error",
        };
        Self::new(kind, &err.to_string())
    }
}
