//! Timeline artifacts handed to the renderer.
//!
//! All times are seconds. These types are produced by the scheduler and
//! consumed read-only downstream.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::Word;

/// Emphasis window for one word inside a caption batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HighlightWindow {
    /// Index of the word within its batch
    pub word_index: usize,
    /// Offset of the word start from the batch start
    pub start_offset: f64,
    /// Offset of the word end from the batch start
    pub end_offset: f64,
    /// Silence between the previous word's end and this word's start
    pub gap_before: f64,
}

/// A group of consecutive words displayed together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CaptionBatch {
    /// Position of the batch in the timeline
    pub index: usize,
    /// Words shown by this batch (empty for the placeholder)
    pub words: Vec<Word>,
    /// Silence before the batch becomes visible
    pub lead_wait: f64,
    /// When the batch becomes visible on the renderer clock
    pub display_start: f64,
    /// Time from the first word start to the last word end
    pub hold: f64,
    /// Extra hold after the last word (final batch only)
    pub trail_pad: f64,
    /// Per-word emphasis windows
    pub highlights: Vec<HighlightWindow>,
    /// Fixed caption shown when there is no transcript
    #[serde(default)]
    pub placeholder: bool,
}

impl CaptionBatch {
    /// How long the batch stays on screen.
    pub fn display_duration(&self) -> f64 {
        self.hold + self.trail_pad
    }

    /// When the batch leaves the screen on the renderer clock.
    pub fn display_end(&self) -> f64 {
        self.display_start + self.display_duration()
    }
}

/// Ordered caption batches for one transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CaptionTimeline {
    /// Maximum words per batch used to build this timeline
    pub batch_size: usize,
    pub batches: Vec<CaptionBatch>,
}

impl CaptionTimeline {
    /// Number of words across all batches.
    pub fn word_count(&self) -> usize {
        self.batches.iter().map(|b| b.words.len()).sum()
    }

    pub fn is_placeholder(&self) -> bool {
        self.batches.len() == 1 && self.batches[0].placeholder
    }

    /// End of the last batch on the renderer clock.
    pub fn end_time(&self) -> f64 {
        self.batches.last().map(|b| b.display_end()).unwrap_or(0.0)
    }
}

/// One scheduled appearance of an image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ImageSlot {
    /// Index into the resolved image list
    pub image_index: usize,
    /// Display duration
    pub duration: f64,
    /// Cumulative offset from schedule start
    pub offset: f64,
}

/// Slideshow schedule covering the target duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ImageSchedule {
    pub slot_length: f64,
    pub total_duration: f64,
    pub slots: Vec<ImageSlot>,
}

impl ImageSchedule {
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Sum of slot durations.
    pub fn covered_duration(&self) -> f64 {
        self.slots.iter().map(|s| s.duration).sum()
    }
}
