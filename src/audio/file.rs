use anyhow::{Context, Result};
use hound::WavReader;
use std::path::Path;
use tracing::info;

use super::codec;
use super::config::AudioConfig;

/// A 16-bit PCM WAV file loaded into memory
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path)
            .context("Failed to open WAV file")?;

        let spec = reader.spec();
        if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
            anyhow::bail!(
                "Unsupported WAV encoding: {} bits {:?}, expected 16-bit PCM",
                spec.bits_per_sample,
                spec.sample_format
            );
        }

        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        let duration_seconds = samples.len() as f64 /
            (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Layout of the samples as raw linear PCM
    pub fn config(&self) -> AudioConfig {
        AudioConfig::linear16(self.sample_rate, self.channels)
    }

    /// Split the file into PCM byte frames of `frame_ms` each
    ///
    /// The last frame may be shorter.
    pub fn frames(&self, frame_ms: u64) -> Vec<Vec<u8>> {
        let config = self.config();
        let frame_len = (config.frames_for(std::time::Duration::from_millis(frame_ms))
            * usize::from(self.channels.max(1)))
        .max(1);

        self.samples
            .chunks(frame_len)
            .map(codec::encode_pcm16)
            .collect()
    }
}
