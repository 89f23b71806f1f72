//! Render job orchestration.
//!
//! This crate provides:
//! - Job lifecycle: isolated working directories and stage bookkeeping
//! - Cleanup registry with deferred deletion timers and a periodic sweep
//! - Collaborator boundaries for media tooling, transcription and rendering
//! - The staged render pipeline
//! - Job logging and metrics

pub mod cleanup;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod render;
pub mod toolkit;
pub mod transcribe;

pub use cleanup::{CleanupReason, CleanupRegistry, DeleteOutcome, SweepReport};
pub use config::{RendererConfig, TranscriberConfig, WorkerConfig};
pub use error::{FailureKind, JobFailure, WorkerError, WorkerResult};
pub use lifecycle::{JobManager, JobWorkspace};
pub use logging::JobLogger;
pub use pipeline::{RenderOutput, RenderPipeline};
pub use render::{CommandRenderer, RenderAsset, RenderInput, Renderer};
pub use toolkit::{FfmpegToolkit, MediaToolkit};
pub use transcribe::{DeepgramTranscriber, Transcriber};
