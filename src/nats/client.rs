use anyhow::{Context, Result};
use async_nats::Client;
use base64::Engine;
use tracing::{debug, info};

use super::messages::{ConversationEventMessage, TalkRequestMessage};

pub struct NatsClient {
    client: Client,
    session_id: String,
}

impl NatsClient {
    /// Connect to NATS server
    pub async fn connect(url: &str, session_id: String) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self { client, session_id })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Publish audio frame to NATS
    pub async fn publish_audio_frame(
        &self,
        pcm_bytes: &[u8],
        sample_rate: u32,
        channels: u16,
        sequence: u32,
        is_final: bool,
    ) -> Result<()> {
        let subject = format!("audio.frame.{}", self.session_id);

        let message = super::messages::AudioFrameMessage {
            session_id: self.session_id.clone(),
            sequence,
            pcm: base64::engine::general_purpose::STANDARD.encode(pcm_bytes),
            sample_rate,
            channels,
            timestamp: chrono::Utc::now().to_rfc3339(),
            final_frame: is_final,
        };

        let payload = serde_json::to_vec(&message)?;

        self.client.publish(subject.clone(), payload.into())
            .await
            .context("Failed to publish audio frame")?;

        debug!(
            "Published audio frame to {} (sequence={}, bytes={}, final={})",
            subject, sequence, pcm_bytes.len(), is_final
        );

        Ok(())
    }

    /// Subscribe to transcript messages
    pub async fn subscribe_transcripts(&self) -> Result<async_nats::Subscriber> {
        // The STT service publishes to stt.text.partial and stt.text.final
        // We filter by session_id in the message payload
        let subject = "stt.text.>";

        info!("Subscribing to transcripts on {}", subject);

        let subscriber = self.client.subscribe(subject)
            .await
            .context("Failed to subscribe to transcripts")?;

        info!("Subscribed to {}", subject);

        Ok(subscriber)
    }

    /// Publish a conversation event for the client
    pub async fn publish_event(&self, event: &ConversationEventMessage) -> Result<()> {
        let subject = format!("conversation.event.{}", self.session_id);
        let payload = serde_json::to_vec(event)?;

        self.client.publish(subject, payload.into())
            .await
            .context("Failed to publish conversation event")?;

        Ok(())
    }

    /// Ask the language model service to respond to (or remember) text
    pub async fn publish_talk_request(
        &self,
        turn_id: &str,
        text: &str,
        history_only: bool,
    ) -> Result<()> {
        let subject = format!("llm.request.{}", self.session_id);

        let message = TalkRequestMessage {
            session_id: self.session_id.clone(),
            turn_id: turn_id.to_string(),
            text: text.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            history_only,
        };
        let payload = serde_json::to_vec(&message)?;

        self.client.publish(subject.clone(), payload.into())
            .await
            .context("Failed to publish talk request")?;

        info!("Published talk request to {} (turn={})", subject, turn_id);

        Ok(())
    }

    /// Subscribe to language model output for this session
    pub async fn subscribe_generations(&self) -> Result<async_nats::Subscriber> {
        let subject = format!("llm.response.{}", self.session_id);

        info!("Subscribing to generations on {}", subject);

        let subscriber = self.client.subscribe(subject)
            .await
            .context("Failed to subscribe to generations")?;

        Ok(subscriber)
    }

    /// Flush pending publishes
    pub async fn close(&self) -> Result<()> {
        info!("Closing NATS connection");
        self.client.flush().await.context("Failed to flush NATS client")?;
        Ok(())
    }
}
