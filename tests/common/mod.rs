// In-memory providers shared by the routing and session tests

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use loqa_agent::audio::{AudioConfig, Recorder};
use loqa_agent::collaborators::{
    inbox, Collaborators, ConversationEvent, ConversationLog, Denoiser, LlmExecutor, Notifier,
    PacketReceiver, Transformer, VoiceActivityDetector,
};
use loqa_agent::messaging::{Message, Messaging};
use loqa_agent::packet::{Metric, Packet, UserAudio};
use loqa_agent::router::{PacketRouter, RouterSettings, TaskSupervisor};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<ConversationEvent>,
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(&self, event: ConversationEvent) -> Result<()> {
        self.tx.send(event)?;
        Ok(())
    }
}

/// Records every request; optionally fails `talk`
pub struct ScriptedExecutor {
    talks: mpsc::UnboundedSender<(String, String)>,
    remembered: Mutex<Vec<String>>,
    fail: bool,
}

impl ScriptedExecutor {
    pub fn remembered(&self) -> Vec<String> {
        self.remembered.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmExecutor for ScriptedExecutor {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn talk(&self, turn_id: &str, text: &str) -> Result<()> {
        self.talks.send((turn_id.to_string(), text.to_string()))?;
        if self.fail {
            anyhow::bail!("model unavailable");
        }
        Ok(())
    }

    async fn remember(&self, _turn_id: &str, text: &str) -> Result<()> {
        self.remembered.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

pub struct ChannelTransformer {
    name: &'static str,
    tx: mpsc::UnboundedSender<Packet>,
}

#[async_trait]
impl Transformer for ChannelTransformer {
    fn name(&self) -> &str {
        self.name
    }

    async fn transform(&self, packet: Packet) -> Result<()> {
        self.tx.send(packet)?;
        Ok(())
    }
}

pub struct ChannelVad {
    tx: mpsc::UnboundedSender<UserAudio>,
}

#[async_trait]
impl VoiceActivityDetector for ChannelVad {
    async fn process(&self, audio: UserAudio) -> Result<()> {
        self.tx.send(audio)?;
        Ok(())
    }
}

/// Replaces audio with a constant byte, or fails
pub struct FixedDenoiser {
    pub fill: Option<u8>,
}

#[async_trait]
impl Denoiser for FixedDenoiser {
    async fn denoise(&self, audio: &[u8]) -> Result<Vec<u8>> {
        match self.fill {
            Some(fill) => Ok(vec![fill; audio.len()]),
            None => anyhow::bail!("denoiser offline"),
        }
    }
}

#[derive(Default)]
pub struct MemoryLog {
    messages: Mutex<Vec<Message>>,
    metrics: Mutex<Vec<(String, Vec<Metric>)>>,
}

impl MemoryLog {
    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().unwrap().clone()
    }

    pub fn metrics(&self) -> Vec<(String, Vec<Metric>)> {
        self.metrics.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConversationLog for MemoryLog {
    async fn create_message(&self, message: Message) -> Result<()> {
        self.messages.lock().unwrap().push(message);
        Ok(())
    }

    async fn record_metrics(&self, context_id: &str, metrics: Vec<Metric>) -> Result<()> {
        self.metrics.lock().unwrap().push((context_id.to_string(), metrics));
        Ok(())
    }
}

/// Receiving ends of every fake provider
pub struct Probes {
    pub events: mpsc::UnboundedReceiver<ConversationEvent>,
    pub talks: mpsc::UnboundedReceiver<(String, String)>,
    pub stt: mpsc::UnboundedReceiver<Packet>,
    pub tts: mpsc::UnboundedReceiver<Packet>,
    pub vad: mpsc::UnboundedReceiver<UserAudio>,
    pub executor: Arc<ScriptedExecutor>,
    pub log: Arc<MemoryLog>,
}

/// Fake providers wired as collaborators
pub fn collaborators(fail_llm: bool, denoiser: Option<FixedDenoiser>) -> (Collaborators, Probes) {
    let (events_tx, events) = mpsc::unbounded_channel();
    let (talks_tx, talks) = mpsc::unbounded_channel();
    let (stt_tx, stt) = mpsc::unbounded_channel();
    let (tts_tx, tts) = mpsc::unbounded_channel();
    let (vad_tx, vad) = mpsc::unbounded_channel();

    let executor = Arc::new(ScriptedExecutor {
        talks: talks_tx,
        remembered: Mutex::new(Vec::new()),
        fail: fail_llm,
    });
    let log = Arc::new(MemoryLog::default());

    let mut collaborators = Collaborators::new(
        executor.clone(),
        Arc::new(ChannelNotifier { tx: events_tx }),
    )
    .with_log(log.clone())
    .with_speech_to_text(Arc::new(ChannelTransformer { name: "stt", tx: stt_tx }))
    .with_text_to_speech(Arc::new(ChannelTransformer { name: "tts", tx: tts_tx }))
    .with_vad(Arc::new(ChannelVad { tx: vad_tx }));

    if let Some(denoiser) = denoiser {
        collaborators = collaborators.with_denoiser(Arc::new(denoiser));
    }

    (
        collaborators,
        Probes {
            events,
            talks,
            stt,
            tts,
            vad,
            executor,
            log,
        },
    )
}

/// A router without end-of-speech debouncing
pub struct Harness {
    pub router: PacketRouter,
    pub messaging: Arc<Messaging>,
    pub recorder: Arc<Recorder>,
    pub inbox: PacketReceiver,
    pub probes: Probes,
}

pub fn harness(settings: RouterSettings) -> Harness {
    harness_with(settings, false, None)
}

pub fn harness_with(
    settings: RouterSettings,
    fail_llm: bool,
    denoiser: Option<FixedDenoiser>,
) -> Harness {
    let (sender, inbox) = inbox();
    let messaging = Arc::new(Messaging::new());
    let recorder = Arc::new(Recorder::default());
    let audio = AudioConfig::linear16(16000, 1);
    recorder.initialize(Some(audio), Some(audio));

    let (collaborators, probes) = collaborators(fail_llm, denoiser);
    let router = PacketRouter::new(
        settings,
        Arc::clone(&messaging),
        Arc::clone(&recorder),
        collaborators,
        sender,
        TaskSupervisor::new(CancellationToken::new()),
    );

    Harness {
        router,
        messaging,
        recorder,
        inbox,
        probes,
    }
}

/// Let background tasks run
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

pub async fn recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(60), rx.recv())
        .await
        .expect("timed out waiting for message")
        .expect("channel closed")
}

pub fn drain<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> Vec<T> {
    let mut items = Vec::new();
    while let Ok(item) = rx.try_recv() {
        items.push(item);
    }
    items
}
