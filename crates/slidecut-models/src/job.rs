//! Job identity and stage bookkeeping.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a job.
///
/// Backed by a random (v4) UUID so two jobs never resolve to the same
/// working directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Parse a caller-supplied id, accepting only the canonical UUID form.
    ///
    /// Used before an id is turned into a filesystem path.
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s)
            .ok()
            .map(|uuid| Self(uuid.hyphenated().to_string()))
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Pipeline stage of a job.
///
/// Stages advance strictly in declaration order; `Failed` is reachable
/// from any non-terminal stage.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    #[default]
    Created,
    FetchingAssets,
    ValidatingVideo,
    ExtractingAudio,
    Transcribing,
    Scheduling,
    Rendering,
    Completed,
    Failed,
}

impl JobStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStage::Created => "created",
            JobStage::FetchingAssets => "fetching_assets",
            JobStage::ValidatingVideo => "validating_video",
            JobStage::ExtractingAudio => "extracting_audio",
            JobStage::Transcribing => "transcribing",
            JobStage::Scheduling => "scheduling",
            JobStage::Rendering => "rendering",
            JobStage::Completed => "completed",
            JobStage::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStage::Completed | JobStage::Failed)
    }

    /// The stage that follows this one on the success path.
    pub fn next(&self) -> Option<JobStage> {
        match self {
            JobStage::Created => Some(JobStage::FetchingAssets),
            JobStage::FetchingAssets => Some(JobStage::ValidatingVideo),
            JobStage::ValidatingVideo => Some(JobStage::ExtractingAudio),
            JobStage::ExtractingAudio => Some(JobStage::Transcribing),
            JobStage::Transcribing => Some(JobStage::Scheduling),
            JobStage::Scheduling => Some(JobStage::Rendering),
            JobStage::Rendering => Some(JobStage::Completed),
            JobStage::Completed | JobStage::Failed => None,
        }
    }

    /// Whether `to` is a legal transition from this stage.
    pub fn can_advance_to(&self, to: JobStage) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == JobStage::Failed || self.next() == Some(to)
    }
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rejected stage transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal stage transition {from} -> {to}")]
pub struct StageTransitionError {
    pub from: JobStage,
    pub to: JobStage,
}

/// A job owned by the lifecycle manager for its active lifetime.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Root of the job's working directory tree
    pub work_dir: PathBuf,

    /// Current stage
    #[serde(default)]
    pub stage: JobStage,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last stage change
    pub updated_at: DateTime<Utc>,

    /// Stage that was active when the job failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at_stage: Option<JobStage>,
}

impl Job {
    /// Create a job in the `Created` stage.
    pub fn new(id: JobId, work_dir: impl Into<PathBuf>) -> Self {
        let now = Utc::now();
        Self {
            id,
            work_dir: work_dir.into(),
            stage: JobStage::Created,
            created_at: now,
            updated_at: now,
            failed_at_stage: None,
        }
    }

    /// Move to `to`. Pure bookkeeping; no side effects beyond this struct.
    pub fn advance(&mut self, to: JobStage) -> Result<(), StageTransitionError> {
        if !self.stage.can_advance_to(to) {
            return Err(StageTransitionError {
                from: self.stage,
                to,
            });
        }
        if to == JobStage::Failed {
            self.failed_at_stage = Some(self.stage);
        }
        self.stage = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }
}
