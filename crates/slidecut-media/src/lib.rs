//! Media-side I/O and scheduling for slidecut jobs.
//!
//! This crate provides:
//! - All-or-nothing concurrent asset downloads with a host allowlist
//! - Post-order removal of job directory trees
//! - FFprobe validation and FFmpeg audio extraction
//! - Caption and slideshow timeline scheduling

pub mod audio;
pub mod command;
pub mod error;
pub mod fetch;
pub mod fs_utils;
pub mod probe;
pub mod source;
pub mod timeline;

pub use audio::{extract_audio, ExtractedAudio};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use error::{DownloadFailure, FetchError, MediaError, MediaResult};
pub use fetch::{AssetFetcher, FetchConfig, FetchedAsset};
pub use fs_utils::{remove_tree, RemoveOutcome};
pub use probe::{is_playable_media, probe_duration, probe_media, MediaInfo};
pub use source::{SourcePolicy, DEFAULT_ALLOWED_HOSTS};
pub use timeline::{
    build_caption_timeline, build_image_schedule, build_timelines, SchedulerSettings, Timelines,
};
