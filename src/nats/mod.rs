pub mod bridge;
pub mod client;
pub mod messages;

pub use bridge::{NatsLlmExecutor, NatsNotifier, NatsSpeechToText};
pub use client::NatsClient;
pub use messages::{
    AudioFrameMessage, ConversationEventMessage, GenerationMessage, TalkRequestMessage,
    TranscriptMessage,
};
