// Timeline mixer for rendering a recorded conversation
//
// User audio is captured continuously, so it is laid on the timeline at the
// offset of its capture timestamp. Agent audio is played back-to-back by the
// client regardless of when it was synthesized, so each agent chunk is placed
// right after the last audible sample already on the timeline.
//
// Samples are accumulated in i32 and clipped to i16 once at the end.

use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::codec;
use super::config::AudioConfig;
use super::recorder::{AudioChunk, AudioStreamSource};

/// Mixing buffer covering a whole conversation
pub struct TimelineMixer {
    target: AudioConfig,
    origin: Instant,
    samples: Vec<i32>,
    /// One past the highest index holding a non-zero sample
    high_water: usize,
}

impl TimelineMixer {
    /// Allocate a silent timeline of `span` starting at `origin`
    pub fn new(target: AudioConfig, origin: Instant, span: Duration) -> Self {
        let len = target.frames_for(span) * usize::from(target.channels.max(1));
        debug!(
            "Timeline mixer allocated: {:.3}s, {}Hz, {} channels",
            span.as_secs_f64(),
            target.sample_rate,
            target.channels
        );

        Self {
            target,
            origin,
            samples: vec![0; len],
            high_water: 0,
        }
    }

    /// Number of interleaved samples currently on the timeline
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Index just after the last non-silent sample
    fn end_of_audio(&self) -> usize {
        let mut end = self.high_water.min(self.samples.len());
        while end > 0 && self.samples[end - 1] == 0 {
            end -= 1;
        }
        end
    }

    /// Add samples into the timeline at the offset of `timestamp`
    ///
    /// Samples falling past the end of the timeline are dropped.
    pub fn mix_at(&mut self, timestamp: Instant, samples: &[i32]) {
        let channels = usize::from(self.target.channels.max(1));
        let offset = timestamp.saturating_duration_since(self.origin);
        let start = self.target.frames_for(offset) * channels;

        for (i, sample) in samples.iter().enumerate() {
            let index = start + i;
            if index >= self.samples.len() {
                break;
            }
            self.samples[index] += *sample;
            if self.samples[index] != 0 {
                self.high_water = self.high_water.max(index + 1);
            }
        }
    }

    /// Place samples right after the last audible sample
    ///
    /// The timeline grows when sequential playback runs past its end.
    pub fn append_after_audio(&mut self, samples: &[i32]) {
        let start = self.end_of_audio();
        let end = start + samples.len();
        if end > self.samples.len() {
            self.samples.resize(end, 0);
        }

        self.samples[start..end].copy_from_slice(samples);
        if let Some(last) = samples.iter().rposition(|s| *s != 0) {
            self.high_water = self.high_water.max(start + last + 1);
        }
    }

    /// Clip the accumulated samples into 16-bit PCM
    pub fn finish(self) -> Vec<i16> {
        self.samples
            .into_iter()
            .map(|sum| sum.clamp(i16::MIN as i32, i16::MAX as i32) as i16)
            .collect()
    }
}

/// Render chronologically ordered chunks into a single 16-bit track
pub fn render(chunks: &[AudioChunk], target: &AudioConfig) -> Vec<i16> {
    let Some(first) = chunks.first() else {
        return Vec::new();
    };

    let origin = first.timestamp;
    let end = chunks
        .iter()
        .map(|chunk| chunk.timestamp + chunk.duration())
        .max()
        .unwrap_or(origin);

    let mut mixer = TimelineMixer::new(*target, origin, end.saturating_duration_since(origin));

    for chunk in chunks {
        let Some(config) = chunk.config else {
            warn!("Skipping {:?} chunk {} without audio config", chunk.source, chunk.id);
            continue;
        };

        let samples = codec::conform(codec::decode(&chunk.data, config.format), &config, target);
        match chunk.source {
            AudioStreamSource::System => mixer.append_after_audio(&samples),
            AudioStreamSource::User => mixer.mix_at(chunk.timestamp, &samples),
        }
    }

    mixer.finish()
}
