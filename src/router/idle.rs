use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::collaborators::PacketSender;
use crate::messaging::Messaging;
use crate::packet::{Directive, StaticText};

pub const DEFAULT_IDLE_MESSAGE: &str = "Are you still there?";

#[derive(Debug, Clone)]
pub struct IdleSettings {
    /// Silence allowed before re-prompting; disabled when `None`
    pub timeout: Option<Duration>,
    /// Re-prompts before the conversation is ended; zero re-prompts forever
    pub backoff: u32,
    pub message: String,
}

impl Default for IdleSettings {
    fn default() -> Self {
        Self {
            timeout: None,
            backoff: 0,
            message: DEFAULT_IDLE_MESSAGE.to_string(),
        }
    }
}

#[derive(Default)]
struct IdleState {
    timer: Option<JoinHandle<()>>,
    generation: u64,
    retries: u32,
}

/// Re-prompts a silent caller and eventually ends the conversation
pub struct IdleTimeout {
    settings: IdleSettings,
    messaging: Arc<Messaging>,
    sender: PacketSender,
    cancel: CancellationToken,
    state: Mutex<IdleState>,
}

impl IdleTimeout {
    pub fn new(
        settings: IdleSettings,
        messaging: Arc<Messaging>,
        sender: PacketSender,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            settings,
            messaging,
            sender,
            cancel,
            state: Mutex::new(IdleState::default()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, IdleState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// (Re)start the countdown, keeping the re-prompt count
    pub fn start(self: &Arc<Self>) {
        let Some(timeout) = self.settings.timeout else {
            return;
        };

        let mut state = self.lock();
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.generation += 1;

        let generation = state.generation;
        let idle = Arc::clone(self);
        let cancel = self.cancel.clone();
        state.timer = Some(tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(timeout) => idle.expire(generation),
            }
        }));
    }

    /// Restart a running countdown after caller activity
    pub fn reset(self: &Arc<Self>) {
        {
            let mut state = self.lock();
            if state.timer.is_none() {
                return;
            }
            state.retries = 0;
        }
        self.start();
    }

    /// Stop counting while the caller holds the floor
    pub fn stop(&self) {
        let mut state = self.lock();
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.generation += 1;
        state.retries = 0;
    }

    pub fn retries(&self) -> u32 {
        self.lock().retries
    }

    fn expire(&self, generation: u64) {
        let mut state = self.lock();
        if state.generation != generation {
            return;
        }
        state.timer = None;
        let turn_id = self.messaging.turn_id();

        if self.settings.backoff > 0 && state.retries >= self.settings.backoff {
            info!("Caller idle after {} re-prompts, ending conversation", state.retries);
            self.sender.send(Directive::end_conversation(turn_id, "idle timeout"));
            return;
        }

        state.retries += 1;
        debug!("Caller idle, re-prompt {}", state.retries);
        self.sender.send(StaticText {
            context_id: turn_id,
            text: self.settings.message.clone(),
        });
    }
}
