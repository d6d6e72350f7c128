use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;

use crate::audio::{self, RecorderConfig};
use crate::eos::SilenceConfig;
use crate::router::{IdleSettings, RouterSettings, DEFAULT_ERROR_MESSAGE, DEFAULT_IDLE_MESSAGE};

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub audio: AudioSettings,
    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub nats_url: String,
}

#[derive(Debug, Deserialize)]
pub struct AudioSettings {
    /// Directory rendered recordings are written to
    pub recordings_path: String,
    /// Layout of caller audio
    pub user: Option<audio::AudioConfig>,
    /// Layout of synthesized agent audio
    pub system: Option<audio::AudioConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub eos_timeout_ms: u64,
    /// Defaults to half of `eos_timeout_ms`
    pub eos_same_text_reduction_ms: Option<u64>,
    pub eos_min_timeout_ms: u64,
    pub vad_noise_threshold: f64,
    pub duplicate_interrupt_min_ms: u64,
    pub duplicate_interrupt_max_ms: u64,
    pub behavior: BehaviorConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            eos_timeout_ms: 1000,
            eos_same_text_reduction_ms: None,
            eos_min_timeout_ms: 100,
            vad_noise_threshold: 3.0,
            duplicate_interrupt_min_ms: 50,
            duplicate_interrupt_max_ms: 100,
            behavior: BehaviorConfig::default(),
        }
    }
}

/// Agent behaviors around the conversation
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Spoken when the session starts
    pub greeting: Option<String>,
    pub idle_timeout_secs: Option<u64>,
    /// Re-prompts before hanging up; 0 keeps re-prompting
    pub idle_timeout_backoff: u32,
    pub idle_timeout_message: Option<String>,
    pub max_session_duration_secs: Option<u64>,
    pub error_message: Option<String>,
}

impl EngineConfig {
    pub fn silence(&self) -> SilenceConfig {
        SilenceConfig {
            timeout: Duration::from_millis(self.eos_timeout_ms),
            same_text_reduction: Duration::from_millis(
                self.eos_same_text_reduction_ms
                    .unwrap_or(self.eos_timeout_ms / 2),
            ),
            min_timeout: Duration::from_millis(self.eos_min_timeout_ms),
        }
    }

    pub fn recorder(&self) -> RecorderConfig {
        RecorderConfig {
            duplicate_interrupt_min: Duration::from_millis(self.duplicate_interrupt_min_ms),
            duplicate_interrupt_max: Duration::from_millis(self.duplicate_interrupt_max_ms),
        }
    }

    pub fn router(&self) -> RouterSettings {
        let behavior = &self.behavior;
        RouterSettings {
            vad_noise_threshold: self.vad_noise_threshold,
            error_message: non_empty(&behavior.error_message)
                .unwrap_or(DEFAULT_ERROR_MESSAGE)
                .to_string(),
            idle: IdleSettings {
                timeout: behavior
                    .idle_timeout_secs
                    .filter(|secs| *secs > 0)
                    .map(Duration::from_secs),
                backoff: behavior.idle_timeout_backoff,
                message: non_empty(&behavior.idle_timeout_message)
                    .unwrap_or(DEFAULT_IDLE_MESSAGE)
                    .to_string(),
            },
        }
    }

    pub fn greeting(&self) -> Option<&str> {
        non_empty(&self.behavior.greeting)
    }

    pub fn max_session_duration(&self) -> Option<Duration> {
        self.behavior
            .max_session_duration_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}

impl Config {
    /// Load `path` (any format the config crate understands), then apply
    /// `LOQA_AGENT__SECTION__KEY` environment overrides
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(
                config::Environment::with_prefix("LOQA_AGENT")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
