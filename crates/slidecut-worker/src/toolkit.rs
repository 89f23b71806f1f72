//! Media validation and audio extraction behind a trait, so the pipeline
//! can run against fakes in tests.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use slidecut_media::{extract_audio, is_playable_media, ExtractedAudio, MediaError};

use crate::error::{WorkerError, WorkerResult};

#[async_trait]
pub trait MediaToolkit: Send + Sync {
    /// Whether `path` is a non-empty file with at least one audio or video
    /// stream.
    async fn is_playable(&self, path: &Path) -> WorkerResult<bool>;

    /// Extract the speech track of `video` into `out_dir`.
    async fn extract_audio(&self, video: &Path, out_dir: &Path) -> WorkerResult<ExtractedAudio>;
}

/// FFmpeg/FFprobe implementation.
#[derive(Debug, Clone)]
pub struct FfmpegToolkit {
    extract_timeout: Duration,
}

impl FfmpegToolkit {
    pub fn new(extract_timeout: Duration) -> Self {
        Self { extract_timeout }
    }
}

/// `<out_dir>/<video stem>.wav`
pub fn audio_path_for(video: &Path, out_dir: &Path) -> PathBuf {
    let stem = video
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "audio".to_string());
    out_dir.join(format!("{}.wav", stem))
}

#[async_trait]
impl MediaToolkit for FfmpegToolkit {
    async fn is_playable(&self, path: &Path) -> WorkerResult<bool> {
        is_playable_media(path).await.map_err(|e| match e {
            MediaError::FfprobeNotFound => WorkerError::config_error(e.to_string()),
            other => WorkerError::invalid_media(other.to_string()),
        })
    }

    async fn extract_audio(&self, video: &Path, out_dir: &Path) -> WorkerResult<ExtractedAudio> {
        let output = audio_path_for(video, out_dir);
        extract_audio(video, &output, self.extract_timeout.as_secs())
            .await
            .map_err(|e| {
                warn!(video = %video.display(), "Audio extraction failed: {}", e);
                WorkerError::extraction_failed(e.to_string())
            })
    }
}
