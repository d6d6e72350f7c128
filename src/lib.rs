pub mod audio;
pub mod collaborators;
pub mod config;
pub mod eos;
pub mod messaging;
pub mod nats;
pub mod packet;
pub mod router;
pub mod session;

pub use audio::{AudioConfig, AudioFile, AudioFormat, Recorder, RecorderConfig, RecorderError};
pub use collaborators::{
    inbox, AgentContent, Collaborators, ConversationEvent, ConversationLog, Denoiser, LlmExecutor,
    Notifier, PacketReceiver, PacketSender, Transformer, VoiceActivityDetector,
};
pub use config::Config;
pub use eos::{EndOfSpeech, SilenceBasedEndOfSpeech, SilenceConfig, SpeechInput};
pub use messaging::{Actor, InputMode, InteractionState, Message, Messaging, TransitionError};
pub use nats::{NatsClient, NatsLlmExecutor, NatsNotifier, NatsSpeechToText};
pub use packet::Packet;
pub use router::{PacketRouter, RouterSettings, TaskSupervisor};
pub use session::{ConversationSession, SessionConfig, SessionStats};
