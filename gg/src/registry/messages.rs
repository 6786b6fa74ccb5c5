//! Job registry messages
//!
//! Commands and responses for the actor pattern.

use thiserror::Error;
use tokio::sync::oneshot;

use crate::domain::{JobRecord, JobStatus, Plan};

/// Errors from registry operations
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Job already exists: {0}")]
    AlreadyExists(String),

    #[error("Job {0} is already being processed")]
    AlreadyClaimed(String),

    #[error("Job {id} cannot move from {from} to {to}")]
    InvalidTransition { id: String, from: JobStatus, to: JobStatus },

    #[error("Channel error")]
    ChannelError,
}

/// Response from registry operations
pub type RegistryResponse<T> = Result<T, RegistryError>;

/// Owner-only mutation of a job record
#[derive(Debug, Clone)]
pub enum JobUpdate {
    /// Move to a non-terminal status
    Status(JobStatus),
    /// Record the base artifact a modify job resolved to
    Base(String),
    /// Move to Ready with the job's outputs and actual base
    Finish {
        plan: Plan,
        game_url: String,
        base_game_id: Option<String>,
    },
    /// Move to Failed with an error message
    Fail(String),
}

impl JobUpdate {
    /// Status the update moves the job to, if it changes status
    pub fn target_status(&self) -> Option<JobStatus> {
        match self {
            Self::Status(status) => Some(*status),
            Self::Base(_) => None,
            Self::Finish { .. } => Some(JobStatus::Ready),
            Self::Fail(_) => Some(JobStatus::Failed),
        }
    }
}

/// Commands sent to the JobRegistry actor
#[derive(Debug)]
pub enum RegistryCommand {
    Insert {
        record: JobRecord,
        reply: oneshot::Sender<RegistryResponse<String>>,
    },
    Get {
        id: String,
        reply: oneshot::Sender<Option<JobRecord>>,
    },
    List {
        reply: oneshot::Sender<Vec<JobRecord>>,
    },
    Claim {
        id: String,
        reply: oneshot::Sender<RegistryResponse<()>>,
    },
    Update {
        id: String,
        update: JobUpdate,
        reply: oneshot::Sender<RegistryResponse<JobRecord>>,
    },
    Shutdown,
}
