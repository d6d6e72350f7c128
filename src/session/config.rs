use std::path::PathBuf;

use crate::audio::AudioConfig;
use crate::config::{Config, EngineConfig};

/// Configuration for a conversation session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Unique session identifier (e.g., "call-2025-10-28-support")
    pub session_id: String,

    /// Layout of caller audio
    pub user_audio: Option<AudioConfig>,

    /// Layout of synthesized agent audio
    pub system_audio: Option<AudioConfig>,

    /// Directory the rendered recording is written to on stop; no file when unset
    pub recordings_path: Option<PathBuf>,

    /// Timing and behavior of the conversation engine
    pub engine: EngineConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("call-{}", uuid::Uuid::new_v4()),
            user_audio: Some(AudioConfig::default()), // 16kHz mono PCM
            system_audio: Some(AudioConfig::default()),
            recordings_path: None,
            engine: EngineConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn from_config(config: &Config, session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            user_audio: config.audio.user,
            system_audio: config.audio.system,
            recordings_path: Some(PathBuf::from(&config.audio.recordings_path)),
            engine: config.engine.clone(),
        }
    }
}
