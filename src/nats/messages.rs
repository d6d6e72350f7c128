use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::collaborators::{AgentContent, ConversationEvent};
use crate::packet::{DirectiveKind, InterruptionSource};

/// Audio frame message published to NATS
#[derive(Debug, Serialize, Deserialize)]
pub struct AudioFrameMessage {
    pub session_id: String,
    pub sequence: u32,
    pub pcm: String,  // Base64-encoded PCM bytes
    pub sample_rate: u32,
    pub channels: u16,
    pub timestamp: String,  // RFC3339 timestamp
    #[serde(rename = "final")]
    pub final_frame: bool,
}

/// Transcript message received from STT service
#[derive(Debug, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub session_id: String,
    pub text: String,
    pub partial: bool,
    pub timestamp: String,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub language: Option<String>,
}

/// Request for the language model to answer the caller
#[derive(Debug, Serialize, Deserialize)]
pub struct TalkRequestMessage {
    pub session_id: String,
    pub turn_id: String,
    pub text: String,
    pub timestamp: String,
    /// Fixed agent speech to add to history without answering it
    #[serde(default)]
    pub history_only: bool,
}

/// Streamed language model output
#[derive(Debug, Serialize, Deserialize)]
pub struct GenerationMessage {
    pub session_id: String,
    pub turn_id: String,
    #[serde(default)]
    pub text: String,
    /// Last message of the response; `text` then holds the full response
    #[serde(default)]
    pub done: bool,
}

/// Conversation event published for the client
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationEventMessage {
    UserMessage {
        session_id: String,
        id: String,
        text: String,
        completed: bool,
        timestamp: String,
    },
    AgentMessage {
        session_id: String,
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        /// Base64-encoded audio bytes
        #[serde(default, skip_serializing_if = "Option::is_none")]
        audio: Option<String>,
        completed: bool,
        timestamp: String,
    },
    Interruption {
        session_id: String,
        id: String,
        source: InterruptionSource,
        timestamp: String,
    },
    Directive {
        session_id: String,
        id: String,
        directive: DirectiveKind,
        #[serde(default)]
        arguments: Map<String, Value>,
        timestamp: String,
    },
}

impl ConversationEventMessage {
    pub fn from_event(session_id: &str, event: ConversationEvent) -> Self {
        let session_id = session_id.to_string();
        match event {
            ConversationEvent::UserMessage {
                id,
                text,
                completed,
                time,
            } => Self::UserMessage {
                session_id,
                id,
                text,
                completed,
                timestamp: time.to_rfc3339(),
            },
            ConversationEvent::AgentMessage {
                id,
                content,
                completed,
                time,
            } => {
                let (text, audio) = match content {
                    Some(AgentContent::Text(text)) => (Some(text), None),
                    Some(AgentContent::Audio(bytes)) => (
                        None,
                        Some(base64::engine::general_purpose::STANDARD.encode(bytes)),
                    ),
                    None => (None, None),
                };
                Self::AgentMessage {
                    session_id,
                    id,
                    text,
                    audio,
                    completed,
                    timestamp: time.to_rfc3339(),
                }
            }
            ConversationEvent::Interruption { id, source, time } => Self::Interruption {
                session_id,
                id,
                source,
                timestamp: time.to_rfc3339(),
            },
            ConversationEvent::Directive {
                id,
                kind,
                arguments,
                time,
            } => Self::Directive {
                session_id,
                id,
                directive: kind,
                arguments,
                timestamp: time.to_rfc3339(),
            },
        }
    }
}
