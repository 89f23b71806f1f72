//! Word-level speech timestamps.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// One transcribed token with start/end offsets in seconds.
///
/// Within a transcript, words are ordered by non-decreasing `start`; a
/// word's `end` may run past the next word's `start`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Word {
    /// Display text (punctuated when the provider supports it)
    #[serde(alias = "punctuated_word")]
    pub text: String,
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    /// Provider confidence (0-1)
    #[serde(default)]
    pub confidence: f64,
}

impl Word {
    pub fn new(text: impl Into<String>, start: f64, end: f64, confidence: f64) -> Self {
        Self {
            text: text.into(),
            start,
            end,
            confidence,
        }
    }

    /// Spoken duration, never negative.
    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}

/// Bring provider output in line with the transcript invariants.
///
/// Negative starts are clamped to zero, `end` is raised to at least `start`,
/// and words are stable-sorted by start time. Overlaps are kept.
pub fn normalize_words(mut words: Vec<Word>) -> Vec<Word> {
    for word in &mut words {
        word.start = word.start.max(0.0);
        word.end = word.end.max(word.start);
    }
    words.sort_by(|a, b| a.start.total_cmp(&b.start));
    words
}
