// Integration tests for the session recorder
//
// Timestamps are passed explicitly so every scenario is deterministic.

use anyhow::Result;
use loqa_agent::audio::{AudioConfig, InterruptOutcome, Recorder, RecorderConfig, RecorderError};
use std::time::{Duration, Instant};

fn pcm(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

fn tone(ms: u64, sample_rate: u32, value: i16) -> Vec<u8> {
    pcm(&vec![value; (sample_rate as u64 * ms / 1000) as usize])
}

fn recorder(config: AudioConfig) -> Recorder {
    let recorder = Recorder::default();
    recorder.initialize(Some(config), Some(config));
    recorder
}

fn wav_samples(bytes: &[u8]) -> Result<Vec<i16>> {
    let reader = hound::WavReader::new(std::io::Cursor::new(bytes))?;
    Ok(reader.into_samples::<i16>().collect::<Result<Vec<_>, _>>()?)
}

#[test]
fn test_interrupt_trims_to_heard_audio() -> Result<()> {
    let config = AudioConfig::linear16(16000, 1);
    let recorder = recorder(config);
    let t0 = Instant::now();

    recorder.system_at(&tone(1000, 16000, 500), t0);
    let outcome = recorder.interrupt_at(t0 + Duration::from_millis(400));

    assert_eq!(outcome, InterruptOutcome::Applied { trimmed: 1, silenced: 0 });
    let chunk = &recorder.chunks()[0];
    assert_eq!(chunk.data.len(), config.bytes_for(Duration::from_millis(400)));
    assert_eq!(chunk.duration(), Duration::from_millis(400));

    Ok(())
}

#[test]
fn test_trim_is_frame_aligned() -> Result<()> {
    for config in [
        AudioConfig::linear16(16000, 1),
        AudioConfig::linear16(44100, 2),
        AudioConfig::mulaw8(8000),
    ] {
        for cut_us in [1u64, 333, 12_345, 250_001, 999_999] {
            let recorder = recorder(config);
            let t0 = Instant::now();
            let data = vec![0x11u8; config.bytes_for(Duration::from_secs(1))];

            recorder.system_at(&data, t0);
            recorder.interrupt_at(t0 + Duration::from_micros(cut_us));

            let trimmed = recorder.chunks()[0].data.len();
            assert_eq!(trimmed % config.bytes_per_frame(), 0, "{:?} at {}us", config, cut_us);
            assert!(trimmed <= data.len());
        }
    }

    Ok(())
}

#[test]
fn test_duplicate_interrupt_is_suppressed() -> Result<()> {
    let config = AudioConfig::linear16(16000, 1);
    let recorder = recorder(config);
    let t0 = Instant::now();

    recorder.system_at(&tone(1000, 16000, 500), t0);
    let first = recorder.interrupt_at(t0 + Duration::from_millis(400));
    // A second agent chunk arrives, then the second detector fires 70ms later
    recorder.system_at(&tone(1000, 16000, 500), t0 + Duration::from_millis(420));
    let second = recorder.interrupt_at(t0 + Duration::from_millis(470));

    assert!(matches!(first, InterruptOutcome::Applied { trimmed: 1, .. }));
    assert_eq!(second, InterruptOutcome::Duplicate);
    // The chunk received after the first interruption is left untouched
    assert_eq!(recorder.chunks()[1].data.len(), 32000);

    Ok(())
}

#[test]
fn test_interrupts_outside_duplicate_window_both_apply() -> Result<()> {
    let config = AudioConfig::linear16(16000, 1);
    let recorder = recorder(config);
    let t0 = Instant::now();

    recorder.system_at(&tone(1000, 16000, 500), t0);
    recorder.interrupt_at(t0 + Duration::from_millis(800));
    let again = recorder.interrupt_at(t0 + Duration::from_millis(810));
    let later = recorder.interrupt_at(t0 + Duration::from_millis(500));

    assert_eq!(again, InterruptOutcome::Applied { trimmed: 0, silenced: 0 });
    assert_eq!(later, InterruptOutcome::Applied { trimmed: 1, silenced: 0 });
    assert_eq!(recorder.chunks()[0].duration(), Duration::from_millis(500));

    Ok(())
}

#[test]
fn test_custom_duplicate_window() -> Result<()> {
    let config = AudioConfig::linear16(16000, 1);
    let recorder = Recorder::new(RecorderConfig {
        duplicate_interrupt_min: Duration::from_millis(0),
        duplicate_interrupt_max: Duration::from_millis(500),
    });
    recorder.initialize(Some(config), Some(config));
    let t0 = Instant::now();

    recorder.interrupt_at(t0);
    assert_eq!(
        recorder.interrupt_at(t0 + Duration::from_millis(300)),
        InterruptOutcome::Duplicate
    );

    Ok(())
}

#[test]
fn test_persist_is_deterministic() -> Result<()> {
    let config = AudioConfig::linear16(16000, 1);
    let recorder = recorder(config);
    let t0 = Instant::now();

    recorder.user_at(&tone(200, 16000, 100), t0);
    recorder.system_at(&tone(300, 16000, 200), t0 + Duration::from_millis(50));
    recorder.user_at(&tone(200, 16000, -50), t0 + Duration::from_millis(300));
    recorder.system_at(&tone(100, 16000, 300), t0 + Duration::from_millis(60));

    let first = recorder.persist()?;
    let second = recorder.persist()?;

    assert_eq!(first, second);
    assert_eq!(&first[0..4], b"RIFF");

    Ok(())
}

#[test]
fn test_persist_layout_and_clipping() -> Result<()> {
    let config = AudioConfig::linear16(1000, 1);
    let recorder = recorder(config);
    let t0 = Instant::now();

    // 4ms caller, agent chunk queued right after, caller again overlapping it
    recorder.user_at(&pcm(&[10, 10, 10, 10]), t0);
    recorder.system_at(&pcm(&[i16::MAX, i16::MAX]), t0 + Duration::from_millis(1));
    recorder.user_at(&pcm(&[100, 100]), t0 + Duration::from_millis(4));

    let samples = wav_samples(&recorder.persist()?)?;

    assert_eq!(samples, vec![10, 10, 10, 10, i16::MAX, i16::MAX]);

    Ok(())
}

#[test]
fn test_persist_mixes_mulaw_agent_into_pcm_recording() -> Result<()> {
    let recorder = Recorder::default();
    recorder.initialize(
        Some(AudioConfig::linear16(16000, 1)),
        Some(AudioConfig::mulaw8(8000)),
    );
    let t0 = Instant::now();

    recorder.system_at(&[0x80, 0xFF], t0);

    let bytes = recorder.persist()?;
    let reader = hound::WavReader::new(std::io::Cursor::new(&bytes))?;
    assert_eq!(reader.spec().sample_rate, 16000);

    let samples = wav_samples(&bytes)?;
    // Upsampled 2x from 8kHz
    assert_eq!(samples, vec![32124, 32124, 0, 0]);

    Ok(())
}

#[test]
fn test_persist_without_chunks_fails() {
    let recorder = recorder(AudioConfig::default());

    assert!(matches!(recorder.persist(), Err(RecorderError::NoChunks)));
}

#[test]
fn test_persist_without_any_config_fails() {
    let recorder = Recorder::default();
    recorder.user_at(&[0, 0], Instant::now());

    assert!(matches!(recorder.persist(), Err(RecorderError::NoAudioConfig)));
}

#[test]
fn test_persist_falls_back_to_system_config() -> Result<()> {
    let recorder = Recorder::default();
    recorder.initialize(None, Some(AudioConfig::linear16(24000, 1)));
    recorder.system_at(&tone(10, 24000, 5), Instant::now());

    let bytes = recorder.persist()?;
    let reader = hound::WavReader::new(std::io::Cursor::new(bytes))?;
    assert_eq!(reader.spec().sample_rate, 24000);
    assert_eq!(reader.spec().bits_per_sample, 16);

    Ok(())
}
