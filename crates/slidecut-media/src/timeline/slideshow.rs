//! Cyclic image slideshow schedule.

use slidecut_models::{ImageSchedule, ImageSlot};

/// Seconds each image is shown by default.
pub const DEFAULT_SLOT_SECONDS: f64 = 3.0;

/// Absorbs float error so `D` that is a whole multiple of the slot never
/// yields a trailing zero-length slot.
const SLOT_COUNT_TOLERANCE: f64 = 1e-9;

/// Upper bound on slots in one schedule. Past it, slots are widened so the
/// schedule still covers the whole duration.
pub const MAX_IMAGE_SLOTS: usize = 10_000;

/// Schedule `image_count` images cyclically in fixed slots covering
/// `total_duration`.
///
/// The final slot is cut to the exact remainder. A duration shorter than
/// one slot yields a single slot of that duration. Zero images, or a
/// non-finite or non-positive duration, give an empty schedule. A duration
/// needing more than [`MAX_IMAGE_SLOTS`] slots gets exactly that many, each
/// `total_duration / MAX_IMAGE_SLOTS` long. Offsets are `i * slot_length`
/// and image order always restarts at image 0.
pub fn build_image_schedule(
    image_count: usize,
    total_duration: f64,
    slot_length: f64,
) -> ImageSchedule {
    let slot_length = if slot_length.is_finite() && slot_length > 0.0 {
        slot_length
    } else {
        DEFAULT_SLOT_SECONDS
    };

    let mut schedule = ImageSchedule {
        slot_length,
        total_duration,
        slots: Vec::new(),
    };

    if image_count == 0 || !total_duration.is_finite() || total_duration <= 0.0 {
        return schedule;
    }

    let wanted = (total_duration / slot_length - SLOT_COUNT_TOLERANCE).ceil();
    let slot_count = if wanted > MAX_IMAGE_SLOTS as f64 {
        schedule.slot_length = total_duration / MAX_IMAGE_SLOTS as f64;
        MAX_IMAGE_SLOTS
    } else {
        (wanted as usize).max(1)
    };
    let slot_length = schedule.slot_length;

    schedule.slots = (0..slot_count)
        .map(|i| {
            let offset = i as f64 * slot_length;
            let duration = if i + 1 == slot_count {
                total_duration - offset
            } else {
                slot_length
            };
            ImageSlot {
                image_index: i % image_count,
                duration,
                offset,
            }
        })
        .collect();

    schedule
}
