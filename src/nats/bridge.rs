// Providers backed by NATS subjects
//
// Lets a session talk to speech recognition and language model services that
// live elsewhere on the bus, and publishes client events back onto it.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::StreamExt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::client::NatsClient;
use super::messages::{ConversationEventMessage, GenerationMessage, TranscriptMessage};
use crate::audio::AudioConfig;
use crate::collaborators::{ConversationEvent, LlmExecutor, Notifier, PacketSender, Transformer};
use crate::packet::{LlmResponseDelta, LlmResponseDone, Packet, SpeechToText};

/// Publishes conversation events on `conversation.event.<session>`
pub struct NatsNotifier {
    client: Arc<NatsClient>,
}

impl NatsNotifier {
    pub fn new(client: Arc<NatsClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Notifier for NatsNotifier {
    async fn notify(&self, event: ConversationEvent) -> Result<()> {
        let message = ConversationEventMessage::from_event(self.client.session_id(), event);
        self.client.publish_event(&message).await
    }
}

/// Streams caller audio to the STT service and feeds its transcripts back
pub struct NatsSpeechToText {
    client: Arc<NatsClient>,
    audio: AudioConfig,
    sequence: AtomicU32,
}

impl NatsSpeechToText {
    pub fn new(client: Arc<NatsClient>, audio: AudioConfig) -> Self {
        Self {
            client,
            audio,
            sequence: AtomicU32::new(0),
        }
    }

    /// Forward this session's transcripts into `sender` until cancelled
    pub async fn listen(
        &self,
        sender: PacketSender,
        cancel: CancellationToken,
    ) -> Result<JoinHandle<()>> {
        let mut subscriber = self
            .client
            .subscribe_transcripts()
            .await
            .context("Failed to subscribe to transcripts")?;
        let session_id = self.client.session_id().to_string();

        Ok(tokio::spawn(async move {
            info!("Transcript receiving task started");

            loop {
                let msg = tokio::select! {
                    _ = cancel.cancelled() => break,
                    msg = subscriber.next() => msg,
                };
                let Some(msg) = msg else {
                    break;
                };

                match serde_json::from_slice::<TranscriptMessage>(&msg.payload) {
                    Ok(transcript) => {
                        // Filter by session_id
                        if transcript.session_id != session_id {
                            continue;
                        }

                        // Context is stamped with the live turn by the router
                        sender.send(SpeechToText {
                            context_id: String::new(),
                            script: transcript.text,
                            confidence: transcript.confidence.unwrap_or(1.0),
                            language: transcript.language,
                            interim: transcript.partial,
                        });
                    }
                    Err(e) => {
                        warn!("Failed to parse transcript message: {}", e);
                    }
                }
            }

            info!("Transcript receiving task stopped");
        }))
    }
}

#[async_trait]
impl Transformer for NatsSpeechToText {
    fn name(&self) -> &str {
        "nats_speech_to_text"
    }

    async fn transform(&self, packet: Packet) -> Result<()> {
        let Packet::UserAudio(audio) = packet else {
            return Ok(());
        };

        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        self.client
            .publish_audio_frame(
                &audio.audio,
                self.audio.sample_rate,
                self.audio.channels,
                sequence,
                false,
            )
            .await
    }

    async fn close(&self) -> Result<()> {
        // Final marker lets the STT service flush its last hypothesis
        self.client
            .publish_audio_frame(
                &[],
                self.audio.sample_rate,
                self.audio.channels,
                self.sequence.load(Ordering::SeqCst),
                true,
            )
            .await
    }
}

/// Language model reached over `llm.request.<session>` / `llm.response.<session>`
pub struct NatsLlmExecutor {
    client: Arc<NatsClient>,
}

impl NatsLlmExecutor {
    pub fn new(client: Arc<NatsClient>) -> Self {
        Self { client }
    }

    /// Forward generated text into `sender` until cancelled
    pub async fn listen(
        &self,
        sender: PacketSender,
        cancel: CancellationToken,
    ) -> Result<JoinHandle<()>> {
        let mut subscriber = self
            .client
            .subscribe_generations()
            .await
            .context("Failed to subscribe to generations")?;

        Ok(tokio::spawn(async move {
            info!("Generation receiving task started");

            loop {
                let msg = tokio::select! {
                    _ = cancel.cancelled() => break,
                    msg = subscriber.next() => msg,
                };
                let Some(msg) = msg else {
                    break;
                };

                match serde_json::from_slice::<GenerationMessage>(&msg.payload) {
                    Ok(generation) if generation.done => {
                        sender.send(LlmResponseDone {
                            context_id: generation.turn_id,
                            text: generation.text,
                        });
                    }
                    Ok(generation) => {
                        sender.send(LlmResponseDelta {
                            context_id: generation.turn_id,
                            text: generation.text,
                        });
                    }
                    Err(e) => {
                        warn!("Failed to parse generation message: {}", e);
                    }
                }
            }

            info!("Generation receiving task stopped");
        }))
    }
}

#[async_trait]
impl LlmExecutor for NatsLlmExecutor {
    fn name(&self) -> &str {
        "nats_llm"
    }

    async fn talk(&self, turn_id: &str, text: &str) -> Result<()> {
        self.client.publish_talk_request(turn_id, text, false).await
    }

    async fn remember(&self, turn_id: &str, text: &str) -> Result<()> {
        self.client.publish_talk_request(turn_id, text, true).await
    }
}
