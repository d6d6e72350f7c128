// Packets flowing through a conversation
//
// Every event in a live conversation, whether it comes from the caller, a
// speech provider, the language model or an internal timer, is represented
// as a packet tagged with the conversation turn it belongs to.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identifier of the conversation turn a packet belongs to
pub type ContextId = String;

/// Raw caller audio
#[derive(Debug, Clone, PartialEq)]
pub struct UserAudio {
    pub context_id: ContextId,
    pub audio: Vec<u8>,
    /// Set once the audio has passed through the denoiser
    pub noise_reduced: bool,
}

/// Text typed by the caller
#[derive(Debug, Clone, PartialEq)]
pub struct UserText {
    pub context_id: ContextId,
    pub text: String,
}

/// Work-in-progress transcription shown to the client
#[derive(Debug, Clone, PartialEq)]
pub struct InterimSpeech {
    pub context_id: ContextId,
    pub speech: String,
}

/// The caller finished their utterance
#[derive(Debug, Clone, PartialEq)]
pub struct EndOfSpeech {
    pub context_id: ContextId,
    pub speech: String,
}

/// What detected the caller talking over the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptionSource {
    /// Transcribed words or typed text
    Word,
    /// Voice activity detection
    Vad,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Interruption {
    pub context_id: ContextId,
    pub source: InterruptionSource,
    /// Detector timing, in seconds
    pub start_at: f64,
    pub end_at: f64,
}

impl Interruption {
    /// Interruption raised by recognized words
    pub fn word(context_id: impl Into<ContextId>) -> Self {
        Self {
            context_id: context_id.into(),
            source: InterruptionSource::Word,
            start_at: 0.0,
            end_at: 0.0,
        }
    }
}

/// Transcription from the speech-to-text provider
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechToText {
    pub context_id: ContextId,
    pub script: String,
    pub confidence: f32,
    pub language: Option<String>,
    /// Partial hypothesis that may still change
    pub interim: bool,
}

/// Fixed text the agent should say (greetings, re-prompts, apologies)
#[derive(Debug, Clone, PartialEq)]
pub struct StaticText {
    pub context_id: ContextId,
    pub text: String,
}

/// Streamed fragment of a model response
#[derive(Debug, Clone, PartialEq)]
pub struct LlmResponseDelta {
    pub context_id: ContextId,
    pub text: String,
}

/// End of a model response, carrying the full text
#[derive(Debug, Clone, PartialEq)]
pub struct LlmResponseDone {
    pub context_id: ContextId,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectiveKind {
    EndConversation,
}

/// Control instruction forwarded to the client
#[derive(Debug, Clone, PartialEq)]
pub struct Directive {
    pub context_id: ContextId,
    pub kind: DirectiveKind,
    pub arguments: Map<String, Value>,
}

impl Directive {
    pub fn end_conversation(context_id: impl Into<ContextId>, reason: &str) -> Self {
        let mut arguments = Map::new();
        arguments.insert("reason".to_string(), Value::String(reason.to_string()));
        Self {
            context_id: context_id.into(),
            kind: DirectiveKind::EndConversation,
            arguments,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub description: String,
}

/// Batch of conversation metrics
#[derive(Debug, Clone, PartialEq)]
pub struct MetricReport {
    pub context_id: ContextId,
    pub metrics: Vec<Metric>,
}

/// Synthesized agent audio
#[derive(Debug, Clone, PartialEq)]
pub struct TextToSpeechAudio {
    pub context_id: ContextId,
    pub audio: Vec<u8>,
}

/// Synthesis of a response finished
#[derive(Debug, Clone, PartialEq)]
pub struct TextToSpeechEnd {
    pub context_id: ContextId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    UserAudio(UserAudio),
    UserText(UserText),
    InterimSpeech(InterimSpeech),
    EndOfSpeech(EndOfSpeech),
    Interruption(Interruption),
    SpeechToText(SpeechToText),
    StaticText(StaticText),
    LlmResponseDelta(LlmResponseDelta),
    LlmResponseDone(LlmResponseDone),
    Directive(Directive),
    Metric(MetricReport),
    TextToSpeechAudio(TextToSpeechAudio),
    TextToSpeechEnd(TextToSpeechEnd),
}

macro_rules! packet_from {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Packet {
                fn from(packet: $ty) -> Self {
                    Packet::$variant(packet)
                }
            }
        )*
    };
}

packet_from! {
    UserAudio => UserAudio,
    UserText => UserText,
    InterimSpeech => InterimSpeech,
    EndOfSpeech => EndOfSpeech,
    Interruption => Interruption,
    SpeechToText => SpeechToText,
    StaticText => StaticText,
    LlmResponseDelta => LlmResponseDelta,
    LlmResponseDone => LlmResponseDone,
    Directive => Directive,
    Metric => MetricReport,
    TextToSpeechAudio => TextToSpeechAudio,
    TextToSpeechEnd => TextToSpeechEnd,
}

impl Packet {
    pub fn context_id(&self) -> &str {
        match self {
            Packet::UserAudio(p) => &p.context_id,
            Packet::UserText(p) => &p.context_id,
            Packet::InterimSpeech(p) => &p.context_id,
            Packet::EndOfSpeech(p) => &p.context_id,
            Packet::Interruption(p) => &p.context_id,
            Packet::SpeechToText(p) => &p.context_id,
            Packet::StaticText(p) => &p.context_id,
            Packet::LlmResponseDelta(p) => &p.context_id,
            Packet::LlmResponseDone(p) => &p.context_id,
            Packet::Directive(p) => &p.context_id,
            Packet::Metric(p) => &p.context_id,
            Packet::TextToSpeechAudio(p) => &p.context_id,
            Packet::TextToSpeechEnd(p) => &p.context_id,
        }
    }

    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Packet::UserAudio(_) => "user_audio",
            Packet::UserText(_) => "user_text",
            Packet::InterimSpeech(_) => "interim_speech",
            Packet::EndOfSpeech(_) => "end_of_speech",
            Packet::Interruption(_) => "interruption",
            Packet::SpeechToText(_) => "speech_to_text",
            Packet::StaticText(_) => "static_text",
            Packet::LlmResponseDelta(_) => "llm_delta",
            Packet::LlmResponseDone(_) => "llm_done",
            Packet::Directive(_) => "directive",
            Packet::Metric(_) => "metric",
            Packet::TextToSpeechAudio(_) => "tts_audio",
            Packet::TextToSpeechEnd(_) => "tts_end",
        }
    }
}
