// Sample decoding and format conversion
//
// Recordings arrive as raw bytes in whatever layout the transport negotiated
// (linear PCM or telephony mu-law, any rate, any channel count). Everything is
// decoded into wide i32 samples so that the timeline mixer can sum streams
// without overflowing, then conformed to the output layout.

use super::config::{AudioConfig, AudioFormat};

/// Decode a single G.711 mu-law byte into a 16-bit linear sample
pub fn mulaw_to_linear(byte: u8) -> i16 {
    let byte = !byte;
    let sign = byte & 0x80;
    let exponent = (byte >> 4) & 0x07;
    let mantissa = byte & 0x0F;

    let mut sample = ((i32::from(mantissa) << 1) + 33) << exponent;
    sample -= 33;
    if sign != 0 {
        sample = -sample;
    }

    (sample << 2) as i16
}

/// Decode raw bytes into interleaved samples
///
/// Trailing bytes that do not form a whole sample are ignored.
pub fn decode(data: &[u8], format: AudioFormat) -> Vec<i32> {
    match format {
        AudioFormat::Linear16 => data
            .chunks_exact(2)
            .map(|pair| i32::from(i16::from_le_bytes([pair[0], pair[1]])))
            .collect(),
        AudioFormat::MuLaw8 => data.iter().map(|b| i32::from(mulaw_to_linear(*b))).collect(),
    }
}

/// Serialize 16-bit samples as little-endian PCM bytes
pub fn encode_pcm16(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Convert decoded samples from one layout to another
///
/// Channels are mapped first (downmix sums channels, upmix duplicates), then
/// the sample rate is converted by nearest-neighbour index mapping.
pub fn conform(samples: Vec<i32>, from: &AudioConfig, to: &AudioConfig) -> Vec<i32> {
    let samples = map_channels(samples, from.channels.max(1), to.channels.max(1));
    resample(samples, from.sample_rate, to.sample_rate, to.channels.max(1))
}

fn map_channels(samples: Vec<i32>, from: u16, to: u16) -> Vec<i32> {
    if from == to {
        return samples;
    }

    let from = usize::from(from);
    let to = usize::from(to);
    let mut out = Vec::with_capacity(samples.len() / from * to);

    for frame in samples.chunks_exact(from) {
        if to == 1 {
            // Sum channels, clipping happens once the whole timeline is rendered
            out.push(frame.iter().sum());
        } else {
            for channel in 0..to {
                out.push(frame[channel.min(from - 1)]);
            }
        }
    }

    out
}

fn resample(samples: Vec<i32>, from_rate: u32, to_rate: u32, channels: u16) -> Vec<i32> {
    if from_rate == to_rate || from_rate == 0 || to_rate == 0 {
        return samples;
    }

    let channels = usize::from(channels);
    let in_frames = samples.len() / channels;
    let out_frames = (in_frames as u64 * u64::from(to_rate) / u64::from(from_rate)) as usize;
    let mut out = Vec::with_capacity(out_frames * channels);

    for frame in 0..out_frames {
        let source = (frame as u64 * u64::from(from_rate) / u64::from(to_rate)) as usize;
        let source = source.min(in_frames.saturating_sub(1));
        out.extend_from_slice(&samples[source * channels..(source + 1) * channels]);
    }

    out
}
