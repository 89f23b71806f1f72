//! Worker error types.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use slidecut_media::{FetchError, MediaError};
use slidecut_models::{JobId, JobStage, RequestError, StageTransitionError};

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] RequestError),

    #[error("Workspace error: {0}")]
    Workspace(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Invalid media: {0}")]
    InvalidMedia(String),

    #[error("Audio extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Transcription failed: {0}")]
    TranscriptionFailed(String),

    #[error("Render failed: {0}")]
    RenderFailed(String),

    #[error("Job timed out after {0} seconds")]
    TimedOut(u64),

    #[error(transparent)]
    IllegalTransition(#[from] StageTransitionError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn workspace(msg: impl Into<String>) -> Self {
        Self::Workspace(msg.into())
    }

    pub fn invalid_media(msg: impl Into<String>) -> Self {
        Self::InvalidMedia(msg.into())
    }

    pub fn extraction_failed(msg: impl Into<String>) -> Self {
        Self::ExtractionFailed(msg.into())
    }

    pub fn transcription_failed(msg: impl Into<String>) -> Self {
        Self::TranscriptionFailed(msg.into())
    }

    pub fn render_failed(msg: impl Into<String>) -> Self {
        Self::RenderFailed(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    /// Taxonomy bucket reported to callers.
    pub fn kind(&self) -> FailureKind {
        match self {
            WorkerError::InvalidInput(_) => FailureKind::InvalidInput,
            WorkerError::Workspace(_) | WorkerError::Io(_) => FailureKind::WorkspaceFailed,
            WorkerError::Fetch(e) if e.is_source_rejected() => FailureKind::SourceRejected,
            WorkerError::Fetch(_) => FailureKind::DownloadFailed,
            WorkerError::InvalidMedia(_) => FailureKind::InvalidMedia,
            WorkerError::ExtractionFailed(_) | WorkerError::Media(_) => {
                FailureKind::ExtractionFailed
            }
            WorkerError::TranscriptionFailed(_) => FailureKind::TranscriptionFailed,
            WorkerError::RenderFailed(_) | WorkerError::ConfigError(_) => FailureKind::RenderFailed,
            WorkerError::TimedOut(_) => FailureKind::TimedOut,
            WorkerError::IllegalTransition(_) => FailureKind::Internal,
        }
    }
}

/// Failure taxonomy shared with HTTP callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    InvalidInput,
    SourceRejected,
    DownloadFailed,
    InvalidMedia,
    ExtractionFailed,
    TranscriptionFailed,
    RenderFailed,
    WorkspaceFailed,
    TimedOut,
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::InvalidInput => "invalid-input",
            FailureKind::SourceRejected => "source-rejected",
            FailureKind::DownloadFailed => "download-failed",
            FailureKind::InvalidMedia => "invalid-media",
            FailureKind::ExtractionFailed => "extraction-failed",
            FailureKind::TranscriptionFailed => "transcription-failed",
            FailureKind::RenderFailed => "render-failed",
            FailureKind::WorkspaceFailed => "workspace-failed",
            FailureKind::TimedOut => "timed-out",
            FailureKind::Internal => "internal",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured failure of one job, naming the stage that failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Error)]
#[serde(rename_all = "camelCase")]
#[error("job {} failed at {stage} ({kind}): {message}", .job_id.as_ref().map(JobId::as_str).unwrap_or("-"))]
pub struct JobFailure {
    /// Absent when the request was rejected before a job existed
    pub job_id: Option<JobId>,
    pub stage: JobStage,
    pub kind: FailureKind,
    pub message: String,
}

impl JobFailure {
    pub fn new(job_id: Option<JobId>, stage: JobStage, error: &WorkerError) -> Self {
        Self {
            job_id,
            stage,
            kind: error.kind(),
            message: error.to_string(),
        }
    }

    pub fn is_invalid_input(&self) -> bool {
        self.kind == FailureKind::InvalidInput
    }
}
