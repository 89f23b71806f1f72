//! Shared data models for the slidecut backend.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, job identity and stage bookkeeping
//! - Word-level transcripts
//! - Caption and slideshow timelines consumed by the renderer
//! - Cleanup registry entries
//! - Render request payloads

pub mod cleanup;
pub mod job;
pub mod request;
pub mod timeline;
pub mod word;

// Re-export common types
pub use cleanup::CleanupEntry;
pub use job::{Job, JobId, JobStage, StageTransitionError};
pub use request::{RenderRequest, RequestError, TemplateVariables};
pub use timeline::{CaptionBatch, CaptionTimeline, HighlightWindow, ImageSchedule, ImageSlot};
pub use word::{normalize_words, Word};
