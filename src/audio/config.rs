use serde::{Deserialize, Serialize};
use std::time::Duration;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Sample encoding of raw audio bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AudioFormat {
    /// 16-bit signed little-endian PCM
    #[default]
    Linear16,
    /// 8-bit G.711 mu-law
    MuLaw8,
}

impl AudioFormat {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            AudioFormat::Linear16 => 2,
            AudioFormat::MuLaw8 => 1,
        }
    }

    /// Byte value that decodes to a zero sample
    pub fn silence_byte(self) -> u8 {
        match self {
            AudioFormat::Linear16 => 0x00,
            AudioFormat::MuLaw8 => 0xFF,
        }
    }
}

/// Describes how a stream of raw audio bytes is laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of interleaved channels
    pub channels: u16,
    /// Sample encoding
    #[serde(default)]
    pub format: AudioFormat,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self::linear16(16000, 1)
    }
}

impl AudioConfig {
    pub fn linear16(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            format: AudioFormat::Linear16,
        }
    }

    /// Telephony audio: 8-bit mu-law, mono
    pub fn mulaw8(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: 1,
            format: AudioFormat::MuLaw8,
        }
    }

    /// Bytes for one sample across all channels
    pub fn bytes_per_frame(&self) -> usize {
        self.format.bytes_per_sample() * usize::from(self.channels.max(1))
    }

    /// Whole frames contained in `byte_len` bytes
    pub fn frames_in(&self, byte_len: usize) -> usize {
        byte_len / self.bytes_per_frame()
    }

    /// Number of whole frames that fit in `duration` at this sample rate
    pub fn frames_for(&self, duration: Duration) -> usize {
        (duration.as_nanos() * u128::from(self.sample_rate) / NANOS_PER_SEC) as usize
    }

    /// Frame-aligned byte length covering `duration`
    pub fn bytes_for(&self, duration: Duration) -> usize {
        self.frames_for(duration) * self.bytes_per_frame()
    }

    /// Playback duration of `byte_len` bytes of audio in this layout
    pub fn duration_of(&self, byte_len: usize) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let frames = self.frames_in(byte_len) as u128;
        let nanos = frames * NANOS_PER_SEC / u128::from(self.sample_rate);
        Duration::from_nanos(nanos as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_per_frame() {
        assert_eq!(AudioConfig::linear16(16000, 1).bytes_per_frame(), 2);
        assert_eq!(AudioConfig::linear16(48000, 2).bytes_per_frame(), 4);
        assert_eq!(AudioConfig::mulaw8(8000).bytes_per_frame(), 1);
    }

    #[test]
    fn test_duration_of_one_second() {
        let config = AudioConfig::linear16(16000, 1);
        assert_eq!(config.duration_of(32000), Duration::from_secs(1));

        let mulaw = AudioConfig::mulaw8(8000);
        assert_eq!(mulaw.duration_of(8000), Duration::from_secs(1));
    }

    #[test]
    fn test_bytes_for_is_frame_aligned() {
        let config = AudioConfig::linear16(44100, 2);
        for ms in [1, 7, 13, 400, 999] {
            let bytes = config.bytes_for(Duration::from_millis(ms));
            assert_eq!(bytes % config.bytes_per_frame(), 0);
        }
    }

    #[test]
    fn test_bytes_for_400ms() {
        let config = AudioConfig::linear16(16000, 1);
        assert_eq!(config.bytes_for(Duration::from_millis(400)), 12800);
    }

    #[test]
    fn test_zero_sample_rate_has_no_duration() {
        let config = AudioConfig::linear16(0, 1);
        assert_eq!(config.duration_of(1024), Duration::ZERO);
    }

    #[test]
    fn test_format_deserializes_snake_case() {
        let config: AudioConfig =
            serde_json::from_str(r#"{"sample_rate":8000,"channels":1,"format":"mu_law8"}"#)
                .unwrap();
        assert_eq!(config, AudioConfig::mulaw8(8000));
    }
}
