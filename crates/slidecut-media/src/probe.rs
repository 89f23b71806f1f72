//! FFprobe media information.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::command::{check_ffprobe, stderr_tail};
use crate::error::{MediaError, MediaResult};

/// Media file information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Container duration in seconds, when reported
    pub duration: Option<f64>,
    /// At least one video stream is present
    pub has_video: bool,
    /// At least one audio stream is present
    pub has_audio: bool,
    /// File size in bytes
    pub size: u64,
}

impl MediaInfo {
    /// Whether the container carries anything a player could decode.
    pub fn is_playable(&self) -> bool {
        self.has_video || self.has_audio
    }
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: Option<FfprobeFormat>,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
}

/// Probe a media file.
pub async fn probe_media(path: impl AsRef<Path>) -> MediaResult<MediaInfo> {
    let path = path.as_ref();

    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|_| MediaError::FileNotFound(path.to_path_buf()))?;

    check_ffprobe()?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: "FFprobe failed".to_string(),
            stderr: Some(stderr_tail(&output.stderr)),
        });
    }

    let mut info = parse_probe_output(&output.stdout)?;
    info.size = metadata.len();
    Ok(info)
}

fn parse_probe_output(stdout: &[u8]) -> MediaResult<MediaInfo> {
    let probe: FfprobeOutput = serde_json::from_slice(stdout)?;

    let has_stream = |kind: &str| {
        probe
            .streams
            .iter()
            .any(|s| s.codec_type.as_deref() == Some(kind))
    };

    let duration = probe
        .format
        .as_ref()
        .and_then(|f| f.duration.as_ref())
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0);

    Ok(MediaInfo {
        duration,
        has_video: has_stream("video"),
        has_audio: has_stream("audio"),
        size: 0,
    })
}

/// Check that a file exists, is non-empty and parses as media with at least
/// one audio or video stream.
///
/// Returns `Ok(false)` for any unplayable file. Errors are reserved for a
/// missing probe binary or a failure to spawn it.
pub async fn is_playable_media(path: impl AsRef<Path>) -> MediaResult<bool> {
    let path = path.as_ref();

    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => {}
        Ok(_) => {
            debug!(path = %path.display(), "Media file is empty or not a regular file");
            return Ok(false);
        }
        Err(_) => {
            debug!(path = %path.display(), "Media file does not exist");
            return Ok(false);
        }
    }

    match probe_media(path).await {
        Ok(info) => {
            if info.has_video && !info.has_audio {
                warn!(path = %path.display(), "Video has no audio stream");
            }
            Ok(info.is_playable())
        }
        Err(e @ (MediaError::FfprobeNotFound | MediaError::Io(_))) => Err(e),
        Err(e) => {
            debug!(path = %path.display(), error = %e, "Media probe rejected file");
            Ok(false)
        }
    }
}

/// Get media duration in seconds.
pub async fn probe_duration(path: impl AsRef<Path>) -> MediaResult<f64> {
    let path = path.as_ref();
    probe_media(path)
        .await?
        .duration
        .ok_or_else(|| MediaError::invalid_media(format!("no duration for {}", path.display())))
}
