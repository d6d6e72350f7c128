use regex::Regex;
use std::sync::{LazyLock, Mutex, MutexGuard};
use tracing::debug;

use crate::packet::{LlmResponseDelta, LlmResponseDone};

/// Sentence terminators, including CJK, Devanagari and Urdu full stops
///
/// A literal pattern, so compiling it cannot fail.
static SENTENCE_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[.!?|;:…。．।۔]").expect("valid sentence boundary pattern"));

#[derive(Default)]
struct AggregatorState {
    context_id: Option<String>,
    buffer: String,
}

/// Regroups streamed model tokens into whole sentences for synthesis
pub struct SentenceAggregator {
    state: Mutex<AggregatorState>,
}

impl SentenceAggregator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(AggregatorState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, AggregatorState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Buffer a delta, returning any complete sentences it finished
    ///
    /// A delta from a different turn discards the text buffered so far.
    pub fn push(&self, delta: &LlmResponseDelta) -> Option<LlmResponseDelta> {
        let mut state = self.lock();
        if state.context_id.as_deref() != Some(delta.context_id.as_str()) {
            if !state.buffer.is_empty() {
                debug!("Discarding {} buffered chars from previous turn", state.buffer.len());
            }
            state.buffer.clear();
            state.context_id = Some(delta.context_id.clone());
        }
        state.buffer.push_str(&delta.text);

        let end = SENTENCE_BOUNDARY.find_iter(&state.buffer).last()?.end();
        let remainder = state.buffer.split_off(end);
        let sentences = std::mem::replace(&mut state.buffer, remainder);

        Some(LlmResponseDelta {
            context_id: delta.context_id.clone(),
            text: sentences,
        })
    }

    /// Flush whatever is buffered for the finished turn
    pub fn finish(&self, done: &LlmResponseDone) -> Option<LlmResponseDelta> {
        let mut state = self.lock();
        if state.context_id.as_deref() != Some(done.context_id.as_str()) {
            state.buffer.clear();
            state.context_id = None;
            return None;
        }
        state.context_id = None;

        let rest = std::mem::take(&mut state.buffer);
        if rest.trim().is_empty() {
            return None;
        }

        Some(LlmResponseDelta {
            context_id: done.context_id.clone(),
            text: rest,
        })
    }

    /// Drop anything buffered
    pub fn reset(&self) {
        let mut state = self.lock();
        state.buffer.clear();
        state.context_id = None;
    }
}

impl Default for SentenceAggregator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(context_id: &str, text: &str) -> LlmResponseDelta {
        LlmResponseDelta {
            context_id: context_id.to_string(),
            text: text.to_string(),
        }
    }

    fn done(context_id: &str) -> LlmResponseDone {
        LlmResponseDone {
            context_id: context_id.to_string(),
            text: String::new(),
        }
    }

    #[test]
    fn test_emits_up_to_last_boundary() {
        let aggregator = SentenceAggregator::new();

        assert!(aggregator.push(&delta("t1", "Hello")).is_none());
        let sentence = aggregator.push(&delta("t1", " there. How are")).unwrap();
        assert_eq!(sentence.text, "Hello there.");

        let sentence = aggregator.push(&delta("t1", " you? I am")).unwrap();
        assert_eq!(sentence.text, " How are you?");

        let rest = aggregator.finish(&done("t1")).unwrap();
        assert_eq!(rest.text, " I am");
    }

    #[test]
    fn test_boundary_pattern_matches_every_terminator() {
        for terminator in ['.', '!', '?', '|', ';', ':', '…', '。', '．', '।', '۔'] {
            assert!(
                SENTENCE_BOUNDARY.is_match(&terminator.to_string()),
                "{} is a boundary",
                terminator
            );
        }
        assert!(!SENTENCE_BOUNDARY.is_match("no boundary here, just commas"));
    }

    #[test]
    fn test_multilingual_boundaries() {
        let aggregator = SentenceAggregator::new();

        let sentence = aggregator.push(&delta("t1", "你好。再见")).unwrap();
        assert_eq!(sentence.text, "你好。");

        let sentence = aggregator.push(&delta("t1", "नमस्ते।")).unwrap();
        assert_eq!(sentence.text, "再见नमस्ते।");
    }

    #[test]
    fn test_new_turn_discards_buffer() {
        let aggregator = SentenceAggregator::new();

        aggregator.push(&delta("t1", "half a sen"));
        let sentence = aggregator.push(&delta("t2", "Fresh start.")).unwrap();

        assert_eq!(sentence.text, "Fresh start.");
        assert_eq!(sentence.context_id, "t2");
    }

    #[test]
    fn test_finish_with_empty_buffer() {
        let aggregator = SentenceAggregator::new();

        aggregator.push(&delta("t1", "Done."));
        assert!(aggregator.finish(&done("t1")).is_none());
    }

    #[test]
    fn test_reset_drops_buffer() {
        let aggregator = SentenceAggregator::new();

        aggregator.push(&delta("t1", "interrupted mid"));
        aggregator.reset();

        assert!(aggregator.finish(&done("t1")).is_none());
    }
}
