use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{
    normalize, EndOfSpeech, EndOfSpeechCallback, EndOfSpeechError, EndOfSpeechResult, SpeechInput,
};

/// Debounce timing
#[derive(Debug, Clone)]
pub struct SilenceConfig {
    /// Silence required after speech before the utterance is complete
    pub timeout: Duration,
    /// Subtracted from the timeout when a final transcript repeats the last one
    pub same_text_reduction: Duration,
    /// Lower bound for a shortened timeout
    pub min_timeout: Duration,
}

impl Default for SilenceConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(1000),
            same_text_reduction: Duration::from_millis(500),
            min_timeout: Duration::from_millis(100),
        }
    }
}

#[derive(Default)]
struct Segment {
    fragments: Vec<String>,
    /// Latest interim hypothesis, replaced by the next final transcript
    pending: Option<String>,
    started_at: Option<DateTime<Utc>>,
}

impl Segment {
    fn touch(&mut self) {
        self.started_at.get_or_insert_with(Utc::now);
    }

    fn push(&mut self, text: &str) {
        let text = text.trim();
        if !text.is_empty() {
            self.touch();
            self.fragments.push(text.to_string());
        }
    }

    fn hold(&mut self, text: &str) {
        self.touch();
        let text = text.trim();
        if !text.is_empty() {
            self.pending = Some(text.to_string());
        }
    }

    fn speech(&self) -> String {
        self.fragments
            .iter()
            .chain(self.pending.iter())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Default)]
struct DetectorState {
    segment: Segment,
    /// Normalized text of the latest transcript and whether it was final
    last_transcript: Option<(String, bool)>,
    timer: Option<JoinHandle<()>>,
    generation: u64,
    closed: bool,
}

/// Fires once the caller has been silent for the configured timeout
pub struct SilenceBasedEndOfSpeech {
    config: SilenceConfig,
    callback: EndOfSpeechCallback,
    cancel: CancellationToken,
    state: Arc<Mutex<DetectorState>>,
}

fn lock(state: &Mutex<DetectorState>) -> MutexGuard<'_, DetectorState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SilenceBasedEndOfSpeech {
    pub fn new(
        config: SilenceConfig,
        callback: EndOfSpeechCallback,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            config,
            callback,
            cancel,
            state: Arc::new(Mutex::new(DetectorState::default())),
        }
    }

    fn shortened_timeout(&self) -> Duration {
        self.config
            .timeout
            .saturating_sub(self.config.same_text_reduction)
            .max(self.config.min_timeout)
    }

    /// Replace any pending timer with one firing after `delay`
    fn arm(&self, state: &mut DetectorState, delay: Duration) {
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.generation += 1;

        let generation = state.generation;
        let shared = Arc::clone(&self.state);
        let callback = Arc::clone(&self.callback);
        let cancel = self.cancel.clone();

        state.timer = Some(tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }

            let result = {
                let mut state = lock(&shared);
                if state.closed || state.generation != generation {
                    return;
                }
                state.timer = None;
                state.last_transcript = None;
                let segment = std::mem::take(&mut state.segment);
                EndOfSpeechResult {
                    speech: segment.speech(),
                    started_at: segment.started_at.unwrap_or_else(Utc::now),
                    ended_at: Utc::now(),
                }
            };

            debug!("End of speech: {:?}", result.speech);
            callback(result);
        }));
    }
}

impl EndOfSpeech for SilenceBasedEndOfSpeech {
    fn name(&self) -> &str {
        "silence_based_end_of_speech"
    }

    fn analyze(&self, input: SpeechInput) -> Result<(), EndOfSpeechError> {
        let mut state = lock(&self.state);
        if state.closed {
            return Err(EndOfSpeechError::Closed);
        }

        let delay = match input {
            SpeechInput::UserText(text) => {
                if text.trim().is_empty() {
                    return Ok(());
                }
                state.segment.push(&text);
                Duration::ZERO
            }
            SpeechInput::Activity => {
                state.segment.touch();
                self.config.timeout
            }
            SpeechInput::Transcript { text, completed } => {
                let normalized = normalize(&text);
                let previous = state.last_transcript.replace((normalized.clone(), completed));
                let repeated = !normalized.is_empty()
                    && previous.as_ref().map(|(last, _)| last) == Some(&normalized);
                let duplicate_final = repeated && previous.is_some_and(|(_, final_)| final_);

                if !completed {
                    state.segment.hold(&text);
                } else if duplicate_final {
                    state.segment.touch();
                } else {
                    state.segment.pending = None;
                    state.segment.push(&text);
                }

                if completed && repeated {
                    self.shortened_timeout()
                } else {
                    self.config.timeout
                }
            }
        };

        self.arm(&mut state, delay);
        Ok(())
    }

    fn close(&self) {
        let mut state = lock(&self.state);
        state.closed = true;
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
    }
}
