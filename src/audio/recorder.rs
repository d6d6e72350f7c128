// Session recorder
//
// Captures every user and agent audio chunk of a conversation with its
// capture time. When the user barges in, agent audio that would still have
// been playing is cut at the interruption point so the rendered recording
// reflects what the user actually heard.

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

use super::config::AudioConfig;
use super::{mixer, wav};

/// Which side of the conversation produced a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioStreamSource {
    /// Caller audio
    User,
    /// Synthesized agent audio
    System,
}

/// One captured piece of audio
#[derive(Debug, Clone)]
pub struct AudioChunk {
    /// Capture order, used to break timestamp ties
    pub id: u64,
    pub data: Vec<u8>,
    /// When the chunk was captured
    pub timestamp: Instant,
    pub source: AudioStreamSource,
    /// Layout of `data`, if known when the chunk was captured
    pub config: Option<AudioConfig>,
}

impl AudioChunk {
    pub fn is_system(&self) -> bool {
        self.source == AudioStreamSource::System
    }

    /// Playback length of the chunk; zero when the layout is unknown
    pub fn duration(&self) -> Duration {
        self.config
            .map(|config| config.duration_of(self.data.len()))
            .unwrap_or_default()
    }
}

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("no audio chunks recorded")]
    NoChunks,
    #[error("no audio configuration available for rendering")]
    NoAudioConfig,
    #[error("failed to encode recording: {0}")]
    Encode(#[from] hound::Error),
}

/// Tuning for interruption handling
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Interruptions closer than this to the previous one are treated as new
    pub duplicate_interrupt_min: Duration,
    /// Interruptions within [min, max] of the previous one are duplicates
    pub duplicate_interrupt_max: Duration,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            duplicate_interrupt_min: Duration::from_millis(50),
            duplicate_interrupt_max: Duration::from_millis(100),
        }
    }
}

/// What an interruption did to the recorded agent audio
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterruptOutcome {
    /// Collapsed into the previous interruption
    Duplicate,
    Applied {
        /// Chunks shortened at the interruption point
        trimmed: usize,
        /// Chunks that had not started playing and were replaced by silence
        silenced: usize,
    },
}

#[derive(Default)]
struct RecorderState {
    chunks: Vec<AudioChunk>,
    last_interrupt: Option<Instant>,
    user_config: Option<AudioConfig>,
    system_config: Option<AudioConfig>,
    next_id: u64,
}

/// Thread-safe recorder for one conversation
pub struct Recorder {
    config: RecorderConfig,
    state: Mutex<RecorderState>,
}

impl Default for Recorder {
    fn default() -> Self {
        Self::new(RecorderConfig::default())
    }
}

impl Recorder {
    pub fn new(config: RecorderConfig) -> Self {
        Self {
            config,
            state: Mutex::new(RecorderState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RecorderState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Set the audio layouts of both sides
    pub fn initialize(&self, user: Option<AudioConfig>, system: Option<AudioConfig>) {
        info!("Recorder initialized: user={:?}, system={:?}", user, system);
        let mut state = self.lock();
        state.user_config = user;
        state.system_config = system;
    }

    /// Record a user chunk captured now
    pub fn user(&self, data: &[u8]) -> u64 {
        self.user_at(data, Instant::now())
    }

    pub fn user_at(&self, data: &[u8], at: Instant) -> u64 {
        self.push(AudioStreamSource::User, data, at)
    }

    /// Record an agent chunk received now
    pub fn system(&self, data: &[u8]) -> u64 {
        self.system_at(data, Instant::now())
    }

    pub fn system_at(&self, data: &[u8], at: Instant) -> u64 {
        self.push(AudioStreamSource::System, data, at)
    }

    fn push(&self, source: AudioStreamSource, data: &[u8], at: Instant) -> u64 {
        let mut state = self.lock();
        let config = match source {
            AudioStreamSource::User => state.user_config,
            AudioStreamSource::System => state.system_config,
        };
        let id = state.next_id;
        state.next_id += 1;
        state.chunks.push(AudioChunk {
            id,
            data: data.to_vec(),
            timestamp: at,
            source,
            config,
        });
        id
    }

    /// Cut agent audio at the current moment
    pub fn interrupt(&self) -> InterruptOutcome {
        self.interrupt_at(Instant::now())
    }

    /// Cut agent audio that was playing, or queued to play, at `at`
    ///
    /// Agent chunks play back-to-back: each starts at the later of its own
    /// capture time and the end of the previous agent chunk.
    pub fn interrupt_at(&self, at: Instant) -> InterruptOutcome {
        let mut state = self.lock();

        if let Some(previous) = state.last_interrupt {
            let elapsed = at.saturating_duration_since(previous);
            if elapsed >= self.config.duplicate_interrupt_min
                && elapsed <= self.config.duplicate_interrupt_max
            {
                debug!("Duplicate interruption {}ms after previous", elapsed.as_millis());
                state.last_interrupt = Some(at);
                return InterruptOutcome::Duplicate;
            }
        }
        state.last_interrupt = Some(at);

        let mut order: Vec<usize> = (0..state.chunks.len())
            .filter(|i| state.chunks[*i].is_system())
            .collect();
        order.sort_by_key(|i| (state.chunks[*i].timestamp, state.chunks[*i].id));

        let mut trimmed = 0;
        let mut silenced = 0;
        let mut previous_end: Option<Instant> = None;

        for index in order {
            let chunk = &mut state.chunks[index];
            let start = match previous_end {
                Some(end) if end > chunk.timestamp => end,
                _ => chunk.timestamp,
            };
            let end = start + chunk.duration();
            previous_end = Some(end);

            if at <= start || at >= end {
                continue;
            }
            let Some(config) = chunk.config else {
                continue;
            };

            let keep = config
                .bytes_for(at - start)
                .min(config.frames_in(chunk.data.len()) * config.bytes_per_frame());
            if keep == 0 {
                let silence = config.format.silence_byte();
                chunk.data.iter_mut().for_each(|b| *b = silence);
                silenced += 1;
            } else {
                chunk.data.truncate(keep);
                trimmed += 1;
            }
        }

        if trimmed + silenced > 0 {
            debug!("Interruption trimmed {} and silenced {} agent chunks", trimmed, silenced);
        }

        InterruptOutcome::Applied { trimmed, silenced }
    }

    /// Render every chunk into a single WAV file
    ///
    /// Rendering does not consume the chunks and is deterministic for a
    /// given set of chunks.
    pub fn persist(&self) -> Result<Vec<u8>, RecorderError> {
        let (mut chunks, target) = {
            let state = self.lock();
            if state.chunks.is_empty() {
                return Err(RecorderError::NoChunks);
            }
            let target = state
                .user_config
                .or(state.system_config)
                .or_else(|| state.chunks.iter().find_map(|chunk| chunk.config))
                .ok_or(RecorderError::NoAudioConfig)?;
            (state.chunks.clone(), target)
        };

        chunks.sort_by_key(|chunk| (chunk.timestamp, chunk.id));

        let samples = mixer::render(&chunks, &target);
        let target = AudioConfig::linear16(target.sample_rate, target.channels);
        let bytes = wav::encode_wav(&samples, &target)?;

        info!(
            "Recording rendered: {} chunks, {:.1}s, {} bytes",
            chunks.len(),
            samples.len() as f64
                / (f64::from(target.sample_rate.max(1)) * f64::from(target.channels.max(1))),
            bytes.len()
        );

        Ok(bytes)
    }

    /// Snapshot of the recorded chunks in capture order
    pub fn chunks(&self) -> Vec<AudioChunk> {
        self.lock().chunks.clone()
    }

    pub fn chunk_count(&self) -> usize {
        self.lock().chunks.len()
    }
}
