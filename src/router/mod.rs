// Packet router
//
// Single entry point for every packet of a live conversation. Each packet is
// classified and its synchronous effects (state transitions, message updates,
// recorder bookkeeping) are applied before the next packet is looked at.
// Provider calls, notifications and storage run in background tasks owned by
// the session and never block routing.

mod aggregator;
mod idle;
mod tasks;

pub use aggregator::SentenceAggregator;
pub use idle::{IdleSettings, IdleTimeout, DEFAULT_IDLE_MESSAGE};
pub use tasks::{OrderedStage, TaskSupervisor};

use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, debug_span, error, info, warn};

use crate::audio::Recorder;
use crate::collaborators::{AgentContent, Collaborators, ConversationEvent, PacketSender};
use crate::eos::{EndOfSpeech as EndOfSpeechDetector, SpeechInput};
use crate::messaging::{Actor, InputMode, InteractionState, Message, Messaging};
use crate::packet::{
    Directive, EndOfSpeech, InterimSpeech, Interruption, InterruptionSource, LlmResponseDelta,
    LlmResponseDone, MetricReport, Packet, SpeechToText, StaticText, TextToSpeechAudio,
    TextToSpeechEnd, UserAudio, UserText,
};

pub const DEFAULT_ERROR_MESSAGE: &str = "Oops! It looks like something went wrong. Let me look into that for you right away. I really appreciate your patience, hang tight while I get this sorted!";

#[derive(Debug, Clone)]
pub struct RouterSettings {
    /// VAD interruptions starting earlier than this are treated as noise
    pub vad_noise_threshold: f64,
    /// Spoken when the language model fails to respond
    pub error_message: String,
    pub idle: IdleSettings,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            vad_noise_threshold: 3.0,
            error_message: DEFAULT_ERROR_MESSAGE.to_string(),
            idle: IdleSettings::default(),
        }
    }
}

/// Routes conversation packets for one session
pub struct PacketRouter {
    settings: RouterSettings,
    messaging: Arc<Messaging>,
    recorder: Arc<Recorder>,
    end_of_speech: Option<Arc<dyn EndOfSpeechDetector>>,
    collaborators: Collaborators,
    aggregator: SentenceAggregator,
    idle: Arc<IdleTimeout>,
    tasks: TaskSupervisor,
    sender: PacketSender,
    notifications: OrderedStage<ConversationEvent>,
    speech_to_text: Option<OrderedStage<Packet>>,
    text_to_speech: Option<OrderedStage<Packet>>,
    vad: Option<OrderedStage<UserAudio>>,
    denoise: Option<OrderedStage<UserAudio>>,
}

impl PacketRouter {
    /// Build a router; must be called from within a Tokio runtime
    pub fn new(
        settings: RouterSettings,
        messaging: Arc<Messaging>,
        recorder: Arc<Recorder>,
        collaborators: Collaborators,
        sender: PacketSender,
        tasks: TaskSupervisor,
    ) -> Self {
        let idle = IdleTimeout::new(
            settings.idle.clone(),
            Arc::clone(&messaging),
            sender.clone(),
            tasks.token(),
        );

        let notifier = Arc::clone(&collaborators.notifier);
        let notifications = OrderedStage::spawn(&tasks, "notify", move |event| {
            let notifier = Arc::clone(&notifier);
            async move { notifier.notify(event).await }
        });

        let speech_to_text = collaborators.speech_to_text.clone().map(|stt| {
            OrderedStage::spawn(&tasks, "speech to text", move |packet| {
                let stt = Arc::clone(&stt);
                async move { stt.transform(packet).await }
            })
        });

        let text_to_speech = collaborators.text_to_speech.clone().map(|tts| {
            OrderedStage::spawn(&tasks, "text to speech", move |packet| {
                let tts = Arc::clone(&tts);
                async move { tts.transform(packet).await }
            })
        });

        let vad = collaborators.vad.clone().map(|vad| {
            OrderedStage::spawn(&tasks, "voice activity", move |audio| {
                let vad = Arc::clone(&vad);
                async move { vad.process(audio).await }
            })
        });

        let denoise = collaborators.denoiser.clone().map(|denoiser| {
            let sender = sender.clone();
            OrderedStage::spawn(&tasks, "denoise", move |audio: UserAudio| {
                let denoiser = Arc::clone(&denoiser);
                let sender = sender.clone();
                async move {
                    let cleaned = match denoiser.denoise(&audio.audio).await {
                        Ok(cleaned) => cleaned,
                        Err(e) => {
                            warn!("Denoise failed, using original audio: {:#}", e);
                            audio.audio.clone()
                        }
                    };
                    sender.send(UserAudio {
                        context_id: audio.context_id,
                        audio: cleaned,
                        noise_reduced: true,
                    });
                    Ok(())
                }
            })
        });

        Self {
            settings,
            messaging,
            recorder,
            end_of_speech: None,
            collaborators,
            aggregator: SentenceAggregator::new(),
            idle,
            tasks,
            sender,
            notifications,
            speech_to_text,
            text_to_speech,
            vad,
            denoise,
        }
    }

    /// Debounce end of speech with `detector` instead of ending on every final transcript
    pub fn with_end_of_speech(mut self, detector: Arc<dyn EndOfSpeechDetector>) -> Self {
        self.end_of_speech = Some(detector);
        self
    }

    pub fn messaging(&self) -> &Arc<Messaging> {
        &self.messaging
    }

    pub fn recorder(&self) -> &Arc<Recorder> {
        &self.recorder
    }

    pub fn idle(&self) -> &Arc<IdleTimeout> {
        &self.idle
    }

    pub fn tasks(&self) -> &TaskSupervisor {
        &self.tasks
    }

    /// Route packets in order
    ///
    /// Must be called from within a Tokio runtime.
    pub fn dispatch(&self, packets: impl IntoIterator<Item = Packet>) {
        for packet in packets {
            self.route(packet);
        }
    }

    fn route(&self, packet: Packet) {
        let kind = packet.kind();
        let span = debug_span!("packet", kind, context_id = %packet.context_id());
        let _entered = span.enter();

        let result = match packet {
            Packet::UserAudio(p) => self.on_user_audio(p),
            Packet::UserText(p) => self.on_user_text(p),
            Packet::InterimSpeech(p) => self.on_interim_speech(p),
            Packet::EndOfSpeech(p) => self.on_end_of_speech(p),
            Packet::Interruption(p) => self.on_interruption(p),
            Packet::SpeechToText(p) => self.on_speech_to_text(p),
            Packet::StaticText(p) => self.on_static_text(p),
            Packet::LlmResponseDelta(p) => self.on_llm_delta(p),
            Packet::LlmResponseDone(p) => self.on_llm_done(p),
            Packet::Directive(p) => self.on_directive(p),
            Packet::Metric(p) => self.on_metric(p),
            Packet::TextToSpeechAudio(p) => self.on_tts_audio(p),
            Packet::TextToSpeechEnd(p) => self.on_tts_end(p),
        };

        if let Err(e) = result {
            warn!("Failed to handle {} packet: {:#}", kind, e);
        }
    }

    /// Shut down background work and release providers
    pub async fn shutdown(&self) {
        self.idle.stop();
        if let Some(eos) = &self.end_of_speech {
            eos.close();
        }
        self.tasks.shutdown().await;

        for provider in [&self.collaborators.speech_to_text, &self.collaborators.text_to_speech]
            .into_iter()
            .flatten()
        {
            if let Err(e) = provider.close().await {
                warn!("Failed to close {}: {:#}", provider.name(), e);
            }
        }
    }

    fn transition(&self, to: InteractionState) -> bool {
        match self.messaging.transition(to) {
            Ok(()) => true,
            Err(e) => {
                debug!("{}", e);
                false
            }
        }
    }

    fn is_stale(&self, context_id: &str) -> bool {
        if self.messaging.is_stale(context_id) {
            debug!("Dropping packet from superseded turn {}", context_id);
            return true;
        }
        false
    }

    fn notify(&self, event: ConversationEvent) {
        self.notifications.push(event);
    }

    fn persist(&self, message: Message) {
        if let Some(log) = &self.collaborators.log {
            let log = Arc::clone(log);
            self.tasks.spawn("conversation log", async move { log.create_message(message).await });
        }
    }

    /// Agent output goes to synthesis only while the caller is on audio
    fn synthesizes(&self) -> bool {
        self.text_to_speech.is_some() && self.messaging.input_mode() == InputMode::Audio
    }

    fn speak(&self, sentence: LlmResponseDelta) {
        if self.is_stale(&sentence.context_id) {
            return;
        }

        self.notify(ConversationEvent::AgentMessage {
            id: sentence.context_id.clone(),
            content: Some(AgentContent::Text(sentence.text.clone())),
            completed: true,
            time: Utc::now(),
        });

        if self.synthesizes() {
            if let Some(tts) = &self.text_to_speech {
                tts.push(Packet::LlmResponseDelta(sentence));
            }
        }
    }

    /// Flush buffered text and close the agent response
    fn finish_response(&self, done: LlmResponseDone) {
        if let Some(rest) = self.aggregator.finish(&done) {
            self.speak(rest);
        }

        match &self.text_to_speech {
            Some(tts) if self.synthesizes() => tts.push(Packet::LlmResponseDone(done)),
            _ => self.notify(ConversationEvent::AgentMessage {
                id: done.context_id,
                content: None,
                completed: true,
                time: Utc::now(),
            }),
        }
    }

    fn on_user_audio(&self, packet: UserAudio) -> Result<()> {
        self.messaging.set_input_mode(InputMode::Audio);

        if !packet.noise_reduced {
            if let Some(denoise) = &self.denoise {
                denoise.push(packet);
                return Ok(());
            }
        }

        self.recorder.user(&packet.audio);
        if let Some(vad) = &self.vad {
            vad.push(packet.clone());
        }
        if let Some(stt) = &self.speech_to_text {
            stt.push(Packet::UserAudio(packet));
        }
        Ok(())
    }

    fn on_user_text(&self, packet: UserText) -> Result<()> {
        if packet.text.trim().is_empty() {
            debug!("Ignoring empty user text");
            return Ok(());
        }

        self.messaging.set_input_mode(InputMode::Text);
        self.route(Interruption::word(packet.context_id).into());
        self.transition(InteractionState::UserSpeaking);

        let message = self.messaging.create(Actor::User, &packet.text);
        self.notify(ConversationEvent::UserMessage {
            id: message.id.clone(),
            text: message.text(),
            completed: false,
            time: Utc::now(),
        });
        match &self.end_of_speech {
            Some(eos) => eos.analyze(SpeechInput::UserText(packet.text))?,
            None => self.route(
                EndOfSpeech {
                    context_id: message.id.clone(),
                    speech: message.text(),
                }
                .into(),
            ),
        }
        Ok(())
    }

    fn on_speech_to_text(&self, packet: SpeechToText) -> Result<()> {
        if packet.interim {
            self.transition(InteractionState::UserSpeaking);
            if let Some(eos) = &self.end_of_speech {
                eos.analyze(SpeechInput::Transcript {
                    text: packet.script.clone(),
                    completed: false,
                })?;
            }
            self.route(
                InterimSpeech {
                    context_id: self.messaging.turn_id(),
                    speech: packet.script,
                }
                .into(),
            );
            return Ok(());
        }

        if packet.script.trim().is_empty() {
            return Ok(());
        }

        self.route(Interruption::word(self.messaging.turn_id()).into());
        self.transition(InteractionState::UserSpeaking);

        let message = self.messaging.create(Actor::User, &packet.script);
        self.notify(ConversationEvent::UserMessage {
            id: message.id.clone(),
            text: message.text(),
            completed: false,
            time: Utc::now(),
        });

        match &self.end_of_speech {
            Some(eos) => eos.analyze(SpeechInput::Transcript {
                text: packet.script,
                completed: true,
            })?,
            None => self.route(
                EndOfSpeech {
                    context_id: message.id.clone(),
                    speech: message.text(),
                }
                .into(),
            ),
        }
        Ok(())
    }

    fn on_interim_speech(&self, packet: InterimSpeech) -> Result<()> {
        self.notify(ConversationEvent::UserMessage {
            id: packet.context_id,
            text: packet.speech,
            completed: false,
            time: Utc::now(),
        });
        Ok(())
    }

    fn on_end_of_speech(&self, packet: EndOfSpeech) -> Result<()> {
        let speech = packet.speech;
        if speech.trim().is_empty() {
            debug!("End of speech without any speech");
            return Ok(());
        }

        self.idle.stop();
        self.transition(InteractionState::UserCompleted);

        // Interim-only utterances never created a caller message
        let message = match self
            .messaging
            .input()
            .filter(|message| message.id == packet.context_id)
        {
            Some(message) => message,
            None => self.messaging.create(Actor::User, &speech),
        };

        self.notify(ConversationEvent::UserMessage {
            id: packet.context_id.clone(),
            text: speech.clone(),
            completed: true,
            time: Utc::now(),
        });
        self.persist(message);

        info!("User said: {}", speech);

        let executor = Arc::clone(&self.collaborators.executor);
        let messaging = Arc::clone(&self.messaging);
        let sender = self.sender.clone();
        let apology = self.settings.error_message.clone();
        let turn_id = packet.context_id;
        self.tasks.spawn("llm talk", async move {
            if let Err(e) = executor.talk(&turn_id, &speech).await {
                error!("{} failed to respond: {:#}", executor.name(), e);
                sender.send(StaticText {
                    context_id: messaging.turn_id(),
                    text: apology,
                });
            }
            Ok(())
        });
        Ok(())
    }

    fn on_interruption(&self, packet: Interruption) -> Result<()> {
        if packet.source == InterruptionSource::Vad
            && packet.start_at < self.settings.vad_noise_threshold
        {
            debug!(
                "Ignoring voice activity at {:.2}s as noise (threshold {:.2}s)",
                packet.start_at, self.settings.vad_noise_threshold
            );
            return Ok(());
        }

        if let Some(eos) = &self.end_of_speech {
            if let Err(e) = eos.analyze(SpeechInput::Activity) {
                debug!("{}", e);
            }
        }
        self.recorder.interrupt();

        match packet.source {
            InterruptionSource::Word => {
                self.idle.reset();
                self.aggregator.reset();
                if !self.transition(InteractionState::Interrupted) {
                    return Ok(());
                }
                self.notify(ConversationEvent::Interruption {
                    id: self.messaging.turn_id(),
                    source: InterruptionSource::Word,
                    time: Utc::now(),
                });
                if let Some(tts) = &self.text_to_speech {
                    tts.push(Packet::Interruption(packet));
                }
            }
            InterruptionSource::Vad => {
                if !self.transition(InteractionState::Interrupt) {
                    return Ok(());
                }
                self.notify(ConversationEvent::Interruption {
                    id: self.messaging.turn_id(),
                    source: InterruptionSource::Vad,
                    time: Utc::now(),
                });
            }
        }
        Ok(())
    }

    fn on_static_text(&self, packet: StaticText) -> Result<()> {
        if packet.text.trim().is_empty() {
            return Ok(());
        }

        if self.messaging.input_mode() == InputMode::Text {
            self.idle.start();
        }

        let message = self.messaging.create(Actor::Agent, &packet.text);
        self.transition(InteractionState::LlmGenerating);

        let executor = Arc::clone(&self.collaborators.executor);
        let (turn_id, text) = (packet.context_id.clone(), packet.text.clone());
        self.tasks.spawn("llm history", async move { executor.remember(&turn_id, &text).await });

        let delta = LlmResponseDelta {
            context_id: packet.context_id.clone(),
            text: packet.text.clone(),
        };
        if let Some(sentence) = self.aggregator.push(&delta) {
            self.speak(sentence);
        }

        self.persist(message);
        self.transition(InteractionState::AgentCompleted);
        self.finish_response(LlmResponseDone {
            context_id: packet.context_id,
            text: packet.text,
        });
        Ok(())
    }

    fn on_llm_delta(&self, packet: LlmResponseDelta) -> Result<()> {
        if self.is_stale(&packet.context_id) {
            return Ok(());
        }

        self.transition(InteractionState::LlmGenerating);
        self.messaging.create(Actor::Agent, &packet.text);
        if let Some(sentence) = self.aggregator.push(&packet) {
            self.speak(sentence);
        }
        Ok(())
    }

    fn on_llm_done(&self, packet: LlmResponseDone) -> Result<()> {
        if self.is_stale(&packet.context_id) {
            return Ok(());
        }

        if self.messaging.input_mode() == InputMode::Text {
            self.idle.start();
        }
        if let Some(message) = self.messaging.output() {
            info!("Agent said: {}", message.text());
            self.persist(message);
        }

        self.transition(InteractionState::AgentCompleted);
        self.finish_response(packet);
        Ok(())
    }

    fn on_directive(&self, packet: Directive) -> Result<()> {
        info!("Directive {:?}", packet.kind);
        self.notify(ConversationEvent::Directive {
            id: packet.context_id,
            kind: packet.kind,
            arguments: packet.arguments,
            time: Utc::now(),
        });
        Ok(())
    }

    fn on_metric(&self, packet: MetricReport) -> Result<()> {
        if packet.metrics.is_empty() {
            return Ok(());
        }
        if let Some(log) = &self.collaborators.log {
            let log = Arc::clone(log);
            self.tasks.spawn("conversation metrics", async move {
                log.record_metrics(&packet.context_id, packet.metrics).await
            });
        }
        Ok(())
    }

    fn on_tts_audio(&self, packet: TextToSpeechAudio) -> Result<()> {
        if self.is_stale(&packet.context_id) {
            return Ok(());
        }

        self.transition(InteractionState::AgentSpeaking);
        self.recorder.system(&packet.audio);
        if self.messaging.input_mode() == InputMode::Audio {
            self.idle.start();
        }

        self.notify(ConversationEvent::AgentMessage {
            id: packet.context_id,
            content: Some(AgentContent::Audio(packet.audio)),
            completed: false,
            time: Utc::now(),
        });
        Ok(())
    }

    fn on_tts_end(&self, packet: TextToSpeechEnd) -> Result<()> {
        if self.is_stale(&packet.context_id) {
            return Ok(());
        }

        self.notify(ConversationEvent::AgentMessage {
            id: packet.context_id,
            content: None,
            completed: true,
            time: Utc::now(),
        });
        Ok(())
    }
}
