use super::config::SessionConfig;
use super::stats::SessionStats;
use crate::audio::{Recorder, RecorderError};
use crate::collaborators::{self, Collaborators, PacketReceiver, PacketSender};
use crate::eos::{EndOfSpeechCallback, EndOfSpeechResult, SilenceBasedEndOfSpeech};
use crate::messaging::{InteractionState, Messaging};
use crate::packet::{Directive, EndOfSpeech, Packet, StaticText};
use crate::router::{PacketRouter, TaskSupervisor};
use anyhow::{Context, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// A live conversation: routes packets, runs behaviors, and records audio
pub struct ConversationSession {
    /// Session configuration
    config: SessionConfig,

    /// When the session was created
    started_at: chrono::DateTime<chrono::Utc>,

    /// Router every packet passes through
    router: Arc<PacketRouter>,

    /// Inbox handle given to providers and timers
    sender: PacketSender,

    /// Inbox drained by the pump task, taken on start
    inbox: Mutex<Option<PacketReceiver>>,

    /// Cancels every task owned by the session
    cancel: CancellationToken,

    /// Whether the session is routing packets
    is_active: Arc<AtomicBool>,

    /// Packets routed so far
    packets_routed: Arc<AtomicUsize>,

    /// Handle for the packet pump task
    pump_task_handle: Arc<Mutex<Option<JoinHandle<()>>>>,

    /// Rendered recording, once stopped
    recording_path: Mutex<Option<PathBuf>>,
}

impl ConversationSession {
    /// Create a conversation session
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: SessionConfig, collaborators: Collaborators) -> Self {
        info!("Creating conversation session: {}", config.session_id);

        let cancel = CancellationToken::new();
        let (sender, inbox) = collaborators::inbox();

        let messaging = Arc::new(Messaging::new());
        let recorder = Arc::new(Recorder::new(config.engine.recorder()));
        recorder.initialize(config.user_audio, config.system_audio);

        // End of speech re-enters the router through the inbox
        let eos_sender = sender.clone();
        let eos_messaging = Arc::clone(&messaging);
        let callback: EndOfSpeechCallback = Arc::new(move |result: EndOfSpeechResult| {
            eos_sender.send(EndOfSpeech {
                context_id: eos_messaging.turn_id(),
                speech: result.speech,
            });
        });
        let end_of_speech = Arc::new(SilenceBasedEndOfSpeech::new(
            config.engine.silence(),
            callback,
            cancel.child_token(),
        ));

        let router = PacketRouter::new(
            config.engine.router(),
            messaging,
            recorder,
            collaborators,
            sender.clone(),
            TaskSupervisor::new(cancel.clone()),
        )
        .with_end_of_speech(end_of_speech);

        Self {
            config,
            started_at: Utc::now(),
            router: Arc::new(router),
            sender,
            inbox: Mutex::new(Some(inbox)),
            cancel,
            is_active: Arc::new(AtomicBool::new(false)),
            packets_routed: Arc::new(AtomicUsize::new(0)),
            pump_task_handle: Arc::new(Mutex::new(None)),
            recording_path: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.config.session_id
    }

    /// Inbox handle for providers feeding this session
    pub fn sender(&self) -> PacketSender {
        self.sender.clone()
    }

    /// Queue a packet for routing
    pub fn dispatch(&self, packet: impl Into<Packet>) -> bool {
        self.sender.send(packet)
    }

    pub fn messaging(&self) -> &Arc<Messaging> {
        self.router.messaging()
    }

    pub fn recorder(&self) -> &Arc<Recorder> {
        self.router.recorder()
    }

    pub fn state(&self) -> InteractionState {
        self.router.messaging().state()
    }

    /// Start routing packets and run the session behaviors
    pub async fn start(&self) -> Result<()> {
        if self.is_active.load(Ordering::SeqCst) {
            warn!("Session already started");
            return Ok(());
        }

        let mut inbox = self
            .inbox
            .lock()
            .await
            .take()
            .context("Session cannot be restarted")?;

        info!("Starting conversation session: {}", self.config.session_id);
        self.is_active.store(true, Ordering::SeqCst);

        let router = Arc::clone(&self.router);
        let cancel = self.cancel.clone();
        let packets_routed = Arc::clone(&self.packets_routed);

        let pump_task = tokio::spawn(async move {
            info!("Packet pump started");

            loop {
                let packet = tokio::select! {
                    _ = cancel.cancelled() => break,
                    packet = inbox.recv() => packet,
                };
                let Some(packet) = packet else {
                    break;
                };

                router.dispatch([packet]);
                packets_routed.fetch_add(1, Ordering::SeqCst);
            }

            info!("Packet pump stopped");
        });

        {
            let mut handle = self.pump_task_handle.lock().await;
            *handle = Some(pump_task);
        }

        let messaging = self.router.messaging();
        if let Some(greeting) = self.config.engine.greeting() {
            self.sender.send(StaticText {
                context_id: messaging.turn_id(),
                text: greeting.to_string(),
            });
        }

        self.router.idle().start();

        if let Some(limit) = self.config.engine.max_session_duration() {
            let sender = self.sender.clone();
            let messaging = Arc::clone(messaging);
            self.router.tasks().spawn("max session duration", async move {
                tokio::time::sleep(limit).await;
                info!("Session reached its {}s limit", limit.as_secs());
                sender.send(Directive::end_conversation(
                    messaging.turn_id(),
                    "max session duration",
                ));
                Ok(())
            });
        }

        info!("Conversation session started successfully");

        Ok(())
    }

    /// Stop the session and write the rendered recording
    pub async fn stop(&self) -> Result<SessionStats> {
        if !self.is_active.load(Ordering::SeqCst) {
            warn!("Session not active");
            return self.get_stats().await;
        }

        info!("Stopping conversation session: {}", self.config.session_id);

        // Mark as stopped and cancel every session task
        self.is_active.store(false, Ordering::SeqCst);
        self.router.shutdown().await;

        {
            let mut handle = self.pump_task_handle.lock().await;
            if let Some(task) = handle.take() {
                if let Err(e) = task.await {
                    error!("Packet pump panicked: {}", e);
                }
            }
        }

        if let Some(dir) = &self.config.recordings_path {
            let path = self.write_recording(dir).await?;
            *self.recording_path.lock().await = path;
        }

        info!("Conversation session stopped successfully");

        self.get_stats().await
    }

    async fn write_recording(&self, dir: &Path) -> Result<Option<PathBuf>> {
        let bytes = match self.router.recorder().persist() {
            Ok(bytes) => bytes,
            Err(RecorderError::NoChunks) => {
                info!("No audio recorded, skipping recording file");
                return Ok(None);
            }
            Err(e) => {
                warn!("Recording could not be rendered: {}", e);
                return Ok(None);
            }
        };

        tokio::fs::create_dir_all(dir)
            .await
            .context("Failed to create recordings directory")?;

        let path = dir.join(format!("{}.wav", self.config.session_id));
        tokio::fs::write(&path, bytes)
            .await
            .context("Failed to write recording")?;

        info!("Recording written to {}", path.display());
        Ok(Some(path))
    }

    /// Get current session statistics
    pub async fn get_stats(&self) -> Result<SessionStats> {
        let duration = Utc::now().signed_duration_since(self.started_at);

        Ok(SessionStats {
            session_id: self.config.session_id.clone(),
            is_active: self.is_active.load(Ordering::SeqCst),
            started_at: self.started_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            state: self.state(),
            packets_routed: self.packets_routed.load(Ordering::SeqCst),
            audio_chunks: self.router.recorder().chunk_count(),
            recording_path: self.recording_path.lock().await.clone(),
        })
    }
}
