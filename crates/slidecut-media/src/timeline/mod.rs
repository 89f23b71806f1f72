//! Timeline scheduling.
//!
//! Pure functions turning word timestamps and a target duration into the
//! caption and slideshow artifacts the renderer consumes. Nothing here does
//! I/O or keeps state between calls, so results can be recomputed freely.

mod captions;
mod slideshow;

pub use captions::{
    build_caption_timeline, DEFAULT_BATCH_SIZE, FINAL_TRAIL_PAD_SECONDS, PLACEHOLDER_SECONDS,
};
pub use slideshow::{build_image_schedule, DEFAULT_SLOT_SECONDS, MAX_IMAGE_SLOTS};

use std::num::NonZeroUsize;

use slidecut_models::{CaptionTimeline, ImageSchedule, Word};

/// Knobs shared by both schedulers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerSettings {
    /// Words shown together in one caption
    pub batch_size: NonZeroUsize,
    /// Seconds each image stays on screen
    pub slot_length: f64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            batch_size: NonZeroUsize::new(DEFAULT_BATCH_SIZE).unwrap_or(NonZeroUsize::MIN),
            slot_length: DEFAULT_SLOT_SECONDS,
        }
    }
}

/// Both render artifacts for one job.
#[derive(Debug, Clone, PartialEq)]
pub struct Timelines {
    pub captions: CaptionTimeline,
    pub images: ImageSchedule,
}

/// Build the caption timeline and image schedule for one video.
pub fn build_timelines(
    words: &[Word],
    image_count: usize,
    total_duration: f64,
    settings: &SchedulerSettings,
) -> Timelines {
    Timelines {
        captions: build_caption_timeline(words, settings.batch_size, Some(total_duration)),
        images: build_image_schedule(image_count, total_duration, settings.slot_length),
    }
}

/// `x` if strictly positive, else zero. NaN maps to zero.
pub(crate) fn non_negative(x: f64) -> f64 {
    if x > 0.0 {
        x
    } else {
        0.0
    }
}
