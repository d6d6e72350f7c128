// Seams to the providers a conversation talks to
//
// Speech recognition, synthesis, voice activity detection, denoising, the
// language model, the client connection and conversation storage all sit
// behind these traits. Providers report results by sending packets back into
// the session inbox.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::messaging::Message;
use crate::packet::{DirectiveKind, InterruptionSource, Metric, Packet, UserAudio};

/// Handle for feeding packets into a session
#[derive(Clone, Debug)]
pub struct PacketSender {
    tx: mpsc::UnboundedSender<Packet>,
}

pub type PacketReceiver = mpsc::UnboundedReceiver<Packet>;

/// Create a session inbox
pub fn inbox() -> (PacketSender, PacketReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (PacketSender { tx }, rx)
}

impl PacketSender {
    /// Queue a packet; returns false once the session has shut down
    pub fn send(&self, packet: impl Into<Packet>) -> bool {
        let packet = packet.into();
        let kind = packet.kind();
        if self.tx.send(packet).is_err() {
            debug!("Dropping {} packet: session inbox closed", kind);
            return false;
        }
        true
    }
}

/// Agent output sent to the client
#[derive(Debug, Clone, PartialEq)]
pub enum AgentContent {
    Text(String),
    Audio(Vec<u8>),
}

/// Event delivered to the client connection
#[derive(Debug, Clone, PartialEq)]
pub enum ConversationEvent {
    UserMessage {
        id: String,
        text: String,
        completed: bool,
        time: DateTime<Utc>,
    },
    AgentMessage {
        id: String,
        content: Option<AgentContent>,
        completed: bool,
        time: DateTime<Utc>,
    },
    Interruption {
        id: String,
        source: InterruptionSource,
        time: DateTime<Utc>,
    },
    Directive {
        id: String,
        kind: DirectiveKind,
        arguments: Map<String, Value>,
        time: DateTime<Utc>,
    },
}

/// Language model runner
#[async_trait]
pub trait LlmExecutor: Send + Sync {
    fn name(&self) -> &str;

    /// Start generating a reply to the caller's utterance
    ///
    /// Responses are streamed back as `LlmResponseDelta` and `LlmResponseDone`
    /// packets tagged with `turn_id`.
    async fn talk(&self, turn_id: &str, text: &str) -> Result<()>;

    /// Add fixed agent speech to the model's history
    async fn remember(&self, _turn_id: &str, _text: &str) -> Result<()> {
        Ok(())
    }
}

/// Streaming speech provider (recognition or synthesis)
#[async_trait]
pub trait Transformer: Send + Sync {
    fn name(&self) -> &str;

    async fn transform(&self, packet: Packet) -> Result<()>;

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Voice activity detector, reporting speech as `Interruption` packets
#[async_trait]
pub trait VoiceActivityDetector: Send + Sync {
    async fn process(&self, audio: UserAudio) -> Result<()>;
}

#[async_trait]
pub trait Denoiser: Send + Sync {
    async fn denoise(&self, audio: &[u8]) -> Result<Vec<u8>>;
}

/// Client connection
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: ConversationEvent) -> Result<()>;
}

/// Conversation storage
#[async_trait]
pub trait ConversationLog: Send + Sync {
    async fn create_message(&self, message: Message) -> Result<()>;

    async fn record_metrics(&self, context_id: &str, metrics: Vec<Metric>) -> Result<()>;
}

/// Providers wired into a session
#[derive(Clone)]
pub struct Collaborators {
    pub executor: Arc<dyn LlmExecutor>,
    pub notifier: Arc<dyn Notifier>,
    pub log: Option<Arc<dyn ConversationLog>>,
    pub speech_to_text: Option<Arc<dyn Transformer>>,
    pub text_to_speech: Option<Arc<dyn Transformer>>,
    pub vad: Option<Arc<dyn VoiceActivityDetector>>,
    pub denoiser: Option<Arc<dyn Denoiser>>,
}

impl Collaborators {
    pub fn new(executor: Arc<dyn LlmExecutor>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            executor,
            notifier,
            log: None,
            speech_to_text: None,
            text_to_speech: None,
            vad: None,
            denoiser: None,
        }
    }

    pub fn with_log(mut self, log: Arc<dyn ConversationLog>) -> Self {
        self.log = Some(log);
        self
    }

    pub fn with_speech_to_text(mut self, stt: Arc<dyn Transformer>) -> Self {
        self.speech_to_text = Some(stt);
        self
    }

    pub fn with_text_to_speech(mut self, tts: Arc<dyn Transformer>) -> Self {
        self.text_to_speech = Some(tts);
        self
    }

    pub fn with_vad(mut self, vad: Arc<dyn VoiceActivityDetector>) -> Self {
        self.vad = Some(vad);
        self
    }

    pub fn with_denoiser(mut self, denoiser: Arc<dyn Denoiser>) -> Self {
        self.denoiser = Some(denoiser);
        self
    }
}
