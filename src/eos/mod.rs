// End-of-speech detection
//
// Decides when the caller has finished an utterance by debouncing speech
// activity. Detectors are fed every transcription and activity signal and
// fire a callback once per utterance.

mod silence;

pub use silence::{SilenceBasedEndOfSpeech, SilenceConfig};

use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;

/// Signal fed into an end-of-speech detector
#[derive(Debug, Clone, PartialEq)]
pub enum SpeechInput {
    /// Typed text, which is complete by construction
    UserText(String),
    /// Speech or interruption activity without new text
    Activity,
    /// Transcription from the speech-to-text provider
    Transcript { text: String, completed: bool },
}

/// A finished caller utterance
#[derive(Debug, Clone, PartialEq)]
pub struct EndOfSpeechResult {
    pub speech: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

pub type EndOfSpeechCallback = Arc<dyn Fn(EndOfSpeechResult) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndOfSpeechError {
    #[error("end-of-speech detector is closed")]
    Closed,
}

pub trait EndOfSpeech: Send + Sync {
    fn name(&self) -> &str;

    /// Feed a signal; must be called from within a Tokio runtime
    fn analyze(&self, input: SpeechInput) -> Result<(), EndOfSpeechError>;

    /// Stop the detector; pending callbacks never fire
    fn close(&self);
}

/// Canonical form of a transcript for equality checks
///
/// Punctuation is dropped, case is folded and whitespace collapsed, so
/// "Hello, world." and "hello world" compare equal.
pub fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_punctuation_and_case() {
        assert_eq!(normalize("Hello, World!"), "hello world");
        assert_eq!(normalize("  what's   up? "), "whats up");
        assert_eq!(normalize("..."), "");
    }
}
