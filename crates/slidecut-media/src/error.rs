//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur during media processing.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("FFprobe not found in PATH")]
    FfprobeNotFound,

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Invalid media file: {0}")]
    InvalidMedia(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl MediaError {
    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create an invalid media error.
    pub fn invalid_media(message: impl Into<String>) -> Self {
        Self::InvalidMedia(message.into())
    }
}

/// Why a single transfer failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DownloadFailure {
    #[error("exceeds the {limit_bytes} byte limit")]
    TooLarge { limit_bytes: u64 },

    #[error("timed out after {after_secs}s")]
    TimedOut { after_secs: u64 },

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("write error: {0}")]
    Write(String),
}

/// Asset fetch errors. Every variant tied to a source carries its URL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("Source rejected: {url}: {reason}")]
    SourceRejected { url: String, reason: String },

    #[error("Download failed: {url}: {reason}")]
    DownloadFailed { url: String, reason: DownloadFailure },

    #[error("Cannot prepare destination {path}: {message}")]
    Destination { path: PathBuf, message: String },

    #[error("HTTP client setup failed: {0}")]
    Client(String),
}

impl FetchError {
    pub fn source_rejected(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SourceRejected {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn download_failed(url: impl Into<String>, reason: DownloadFailure) -> Self {
        Self::DownloadFailed {
            url: url.into(),
            reason,
        }
    }

    /// The offending source URL, when the error is tied to one.
    pub fn url(&self) -> Option<&str> {
        match self {
            FetchError::SourceRejected { url, .. } | FetchError::DownloadFailed { url, .. } => {
                Some(url)
            }
            FetchError::Destination { .. } | FetchError::Client(_) => None,
        }
    }

    pub fn is_source_rejected(&self) -> bool {
        matches!(self, FetchError::SourceRejected { .. })
    }
}
