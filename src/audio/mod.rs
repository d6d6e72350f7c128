pub mod codec;
pub mod config;
pub mod file;
pub mod mixer;
pub mod recorder;
pub mod wav;

pub use config::{AudioConfig, AudioFormat};
pub use file::AudioFile;
pub use mixer::TimelineMixer;
pub use recorder::{
    AudioChunk, AudioStreamSource, InterruptOutcome, Recorder, RecorderConfig, RecorderError,
};
pub use wav::encode_wav;
