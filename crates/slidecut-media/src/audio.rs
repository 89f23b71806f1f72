//! Speech audio extraction.

use std::path::{Path, PathBuf};
use tracing::info;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use crate::probe::probe_duration;

/// Sample rate used for transcription audio.
pub const SPEECH_SAMPLE_RATE: u32 = 16_000;

/// A mono PCM track cut from a video.
#[derive(Debug, Clone)]
pub struct ExtractedAudio {
    pub path: PathBuf,
    /// Duration in seconds
    pub duration: f64,
}

/// Extract the audio track of `video` into `output` as mono 16 kHz WAV and
/// report its duration.
pub async fn extract_audio(
    video: impl AsRef<Path>,
    output: impl AsRef<Path>,
    timeout_secs: u64,
) -> MediaResult<ExtractedAudio> {
    let video = video.as_ref();
    let output = output.as_ref();

    let cmd = FfmpegCommand::new(video, output)
        .no_video()
        .audio_codec("pcm_s16le")
        .audio_channels(1)
        .sample_rate(SPEECH_SAMPLE_RATE);

    FfmpegRunner::new().with_timeout(timeout_secs).run(&cmd).await?;

    let duration = probe_duration(output).await?;
    info!(
        video = %video.display(),
        audio = %output.display(),
        duration,
        "Extracted speech audio"
    );

    Ok(ExtractedAudio {
        path: output.to_path_buf(),
        duration,
    })
}
