// Interaction state machine
//
// Tracks the conversational phase of a session together with the messages of
// the turn in progress. The turn id advances whenever the caller starts a new
// turn by talking over the agent; packets carrying an older turn id are stale.

mod message;
mod state;

pub use message::{Actor, InputMode, Message};
pub use state::{InteractionState, TransitionError};

use std::sync::{Mutex, MutexGuard};
use tracing::debug;
use uuid::Uuid;

struct MessagingState {
    state: InteractionState,
    turn_id: String,
    mode: InputMode,
    /// Caller message of the current turn
    input: Option<Message>,
    /// Agent message of the current turn
    output: Option<Message>,
}

/// Per-session conversation state
pub struct Messaging {
    inner: Mutex<MessagingState>,
}

impl Default for Messaging {
    fn default() -> Self {
        Self::new()
    }
}

impl Messaging {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MessagingState {
                state: InteractionState::Unknown,
                turn_id: new_turn_id(),
                mode: InputMode::default(),
                input: None,
                output: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MessagingState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> InteractionState {
        self.lock().state
    }

    /// Identifier of the turn in progress
    pub fn turn_id(&self) -> String {
        self.lock().turn_id.clone()
    }

    /// Whether `context_id` belongs to a turn that has been superseded
    pub fn is_stale(&self, context_id: &str) -> bool {
        self.lock().turn_id != context_id
    }

    pub fn input_mode(&self) -> InputMode {
        self.lock().mode
    }

    pub fn set_input_mode(&self, mode: InputMode) {
        let mut inner = self.lock();
        if inner.mode != mode {
            debug!("Input mode switched to {:?}", mode);
            inner.mode = mode;
        }
    }

    /// Move to `to`, applying the side effects of the transition
    ///
    /// Talking over the agent clears the caller message and starts a new turn.
    /// Completing the agent turn clears the agent message.
    pub fn transition(&self, to: InteractionState) -> Result<(), TransitionError> {
        let mut inner = self.lock();
        let from = inner.state;

        if !from.can_transition_to(to) {
            return Err(TransitionError { from, to });
        }

        if to.is_interruption() && from.is_agent_turn() {
            inner.input = None;
            inner.turn_id = new_turn_id();
            debug!("New turn started: {}", inner.turn_id);
        }
        if to == InteractionState::AgentCompleted {
            inner.output = None;
        }

        inner.state = to;
        Ok(())
    }

    /// Add text to the current turn's message for `actor`
    ///
    /// Returns a snapshot of the message after the text was merged.
    pub fn create(&self, actor: Actor, text: &str) -> Message {
        let mut inner = self.lock();
        let turn_id = inner.turn_id.clone();
        let mode = inner.mode;
        let slot = match actor {
            Actor::User => &mut inner.input,
            Actor::Agent => &mut inner.output,
        };

        if let Some(message) = slot
            .as_mut()
            .filter(|message| message.id == turn_id && message.actor == actor)
        {
            message.append(text);
            return message.clone();
        }

        let message = Message::new(turn_id, actor, mode, text);
        *slot = Some(message.clone());
        message
    }

    pub fn input(&self) -> Option<Message> {
        self.lock().input.clone()
    }

    pub fn output(&self) -> Option<Message> {
        self.lock().output.clone()
    }
}

fn new_turn_id() -> String {
    Uuid::new_v4().to_string()
}
