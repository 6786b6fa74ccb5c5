//! LLM error types

use std::time::Duration;
use thiserror::Error;

/// Errors from a completion call
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl LlmError {
    /// Whether a later attempt could succeed
    ///
    /// Jobs surface these as transient failures; everything else is a
    /// backend fault no retry will fix.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::RateLimited { .. } | LlmError::Network(_) | LlmError::Timeout(_) => true,
            LlmError::ApiError { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            LlmError::InvalidResponse(_) | LlmError::Json(_) | LlmError::Config(_) => false,
        }
    }

    /// Server-requested wait before the next attempt
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            LlmError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}
