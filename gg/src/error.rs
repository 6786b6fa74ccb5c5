//! Pipeline error types

use thiserror::Error;

use crate::llm::LlmError;
use crate::registry::RegistryError;

/// Errors raised while creating or processing a generation job
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Malformed request, returned synchronously by `create`
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// A lineage or state precondition does not hold
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// The repair loop ran out of attempts
    #[error("Generation invalid after {attempts} attempt(s): {}", .violations.join("; "))]
    GenerationInvalid { attempts: u32, violations: Vec<String> },

    /// A required runtime file or preset is absent
    #[error("Missing dependency: {0}")]
    MissingDependency(String),

    /// A composed program or bundle failed a check
    #[error("Validation failed: {}", .violations.join("; "))]
    ValidationFailed { violations: Vec<String> },

    /// Retryable backend failure that outlived the transport's retries
    #[error("Transient backend failure: {0}")]
    Transient(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),
}

impl From<LlmError> for PipelineError {
    fn from(err: LlmError) -> Self {
        if err.is_retryable() {
            PipelineError::Transient(err.to_string())
        } else {
            PipelineError::Backend(err.to_string())
        }
    }
}

impl From<eyre::Report> for PipelineError {
    fn from(err: eyre::Report) -> Self {
        PipelineError::Store(format!("{:#}", err))
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Store(err.to_string())
    }
}

/// Result alias for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;
