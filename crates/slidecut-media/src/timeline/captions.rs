//! Caption batching and per-word highlight windows.

use std::num::NonZeroUsize;

use slidecut_models::{CaptionBatch, CaptionTimeline, HighlightWindow, Word};

use super::non_negative;

/// Words per caption when nothing else is configured.
pub const DEFAULT_BATCH_SIZE: usize = 4;

/// Placeholder caption length when the duration is unknown.
pub const PLACEHOLDER_SECONDS: f64 = 5.0;

/// Extra hold after the final batch.
pub const FINAL_TRAIL_PAD_SECONDS: f64 = 1.0;

/// Partition `words` into caption batches of at most `batch_size`.
///
/// Waits are measured from the previous batch's last word end and clamped
/// at zero, so overlapping timestamps never yield negative time. Each
/// batch's `display_start` is placed on the renderer clock (previous batch
/// end plus lead wait), which keeps batch windows in order.
///
/// An empty transcript yields a single placeholder batch lasting
/// `min(total_duration, PLACEHOLDER_SECONDS)`.
pub fn build_caption_timeline(
    words: &[Word],
    batch_size: NonZeroUsize,
    total_duration: Option<f64>,
) -> CaptionTimeline {
    let batch_size = batch_size.get();

    if words.is_empty() {
        return CaptionTimeline {
            batch_size,
            batches: vec![placeholder_batch(total_duration)],
        };
    }

    let chunk_count = words.len().div_ceil(batch_size);
    let mut batches = Vec::with_capacity(chunk_count);
    let mut previous_end: Option<f64> = None;
    let mut clock = 0.0;

    for (index, chunk) in words.chunks(batch_size).enumerate() {
        let first = &chunk[0];
        let last = &chunk[chunk.len() - 1];

        let lead_wait = match previous_end {
            None => non_negative(first.start),
            Some(end) => non_negative(first.start - end),
        };
        let hold = non_negative(last.end - first.start);
        let trail_pad = if index + 1 == chunk_count {
            FINAL_TRAIL_PAD_SECONDS
        } else {
            0.0
        };

        let display_start = clock + lead_wait;
        clock = display_start + hold + trail_pad;
        previous_end = Some(last.end);

        batches.push(CaptionBatch {
            index,
            words: chunk.to_vec(),
            lead_wait,
            display_start,
            hold,
            trail_pad,
            highlights: highlight_windows(chunk),
            placeholder: false,
        });
    }

    CaptionTimeline {
        batch_size,
        batches,
    }
}

fn highlight_windows(chunk: &[Word]) -> Vec<HighlightWindow> {
    let batch_start = chunk[0].start;
    let mut previous_end: Option<f64> = None;

    chunk
        .iter()
        .enumerate()
        .map(|(word_index, word)| {
            let start_offset = non_negative(word.start - batch_start);
            let end_offset = start_offset.max(word.end - batch_start);
            let gap_before = previous_end
                .map(|end| non_negative(word.start - end))
                .unwrap_or(0.0);
            previous_end = Some(word.end);

            HighlightWindow {
                word_index,
                start_offset,
                end_offset,
                gap_before,
            }
        })
        .collect()
}

fn placeholder_batch(total_duration: Option<f64>) -> CaptionBatch {
    let hold = match total_duration {
        Some(d) if d.is_finite() => non_negative(d).min(PLACEHOLDER_SECONDS),
        _ => PLACEHOLDER_SECONDS,
    };

    CaptionBatch {
        index: 0,
        words: Vec::new(),
        lead_wait: 0.0,
        display_start: 0.0,
        hold,
        trail_pad: 0.0,
        highlights: Vec::new(),
        placeholder: true,
    }
}
