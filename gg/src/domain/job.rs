//! Job domain type
//!
//! A job is one prompt-to-artifact run. Its status only moves forward through
//! `designing -> building -> testing -> ready`, with a single escape to
//! `failed` from any non-terminal state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::Plan;

/// Status of a generation job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Plan is being produced
    Designing,
    /// Program is being produced and the bundle assembled
    Building,
    /// Bundle is being smoke-checked
    Testing,
    /// Bundle is available
    Ready,
    /// Job stopped with an error
    Failed,
}

impl JobStatus {
    fn rank(self) -> u8 {
        match self {
            Self::Designing => 0,
            Self::Building => 1,
            Self::Testing => 2,
            Self::Ready => 3,
            Self::Failed => 4,
        }
    }

    /// Ready and Failed are final
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Ready | Self::Failed)
    }

    /// Whether a job in this status may move to `next`
    ///
    /// Re-entering the current non-terminal status is allowed; skipping a
    /// stage or moving backwards is not.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            Self::Failed => true,
            _ => next.rank() == self.rank() || next.rank() == self.rank() + 1,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Designing => write!(f, "designing"),
            Self::Building => write!(f, "building"),
            Self::Testing => write!(f, "testing"),
            Self::Ready => write!(f, "ready"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Whether a job creates a new game or modifies an existing artifact
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    #[default]
    New,
    Modify,
}

impl std::fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::Modify => write!(f, "modify"),
        }
    }
}

impl std::str::FromStr for GenerationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "new" => Ok(Self::New),
            "modify" => Ok(Self::Modify),
            _ => Err(format!("Unknown mode: {}. Use new or modify", s)),
        }
    }
}

/// One generation job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    /// Unique job id (UUID v7, simple form)
    pub id: String,

    pub prompt: String,

    pub mode: GenerationMode,

    /// Artifact this job modifies
    ///
    /// Filled in with the resolved base once a modify job has found one.
    pub base_game_id: Option<String>,

    pub status: JobStatus,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,

    /// Failure description when status is Failed
    pub error: Option<String>,

    /// Location of the bundle entry page when status is Ready
    pub game_url: Option<String>,

    /// Accepted plan when status is Ready
    pub plan: Option<Plan>,
}

impl JobRecord {
    /// Create a new job in the Designing status with a fresh id
    pub fn new(prompt: impl Into<String>, mode: GenerationMode, base_game_id: Option<String>) -> Self {
        let now = Utc::now();
        let record = Self {
            id: Uuid::now_v7().simple().to_string(),
            prompt: prompt.into(),
            mode,
            base_game_id,
            status: JobStatus::Designing,
            created_at: now,
            updated_at: now,
            error: None,
            game_url: None,
            plan: None,
        };
        debug!(id = %record.id, %mode, "JobRecord::new: created");
        record
    }

    pub fn set_status(&mut self, status: JobStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    pub fn set_error(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
        self.updated_at = Utc::now();
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
