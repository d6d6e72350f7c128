use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Conversational phase of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionState {
    #[default]
    Unknown,
    UserSpeaking,
    UserCompleted,
    AgentSpeaking,
    AgentCompleted,
    LlmGenerating,
    /// Voice activity detected while the agent had the floor
    Interrupt,
    /// Recognized words while the agent had the floor
    Interrupted,
}

impl InteractionState {
    pub const ALL: [InteractionState; 8] = [
        InteractionState::Unknown,
        InteractionState::UserSpeaking,
        InteractionState::UserCompleted,
        InteractionState::AgentSpeaking,
        InteractionState::AgentCompleted,
        InteractionState::LlmGenerating,
        InteractionState::Interrupt,
        InteractionState::Interrupted,
    ];

    /// Whether moving from `self` to `to` is legal
    pub fn can_transition_to(self, to: InteractionState) -> bool {
        use InteractionState::*;

        !matches!(
            (self, to),
            (_, Unknown)
                | (AgentSpeaking, UserSpeaking)
                | (UserSpeaking | Interrupt | Interrupted, AgentSpeaking)
                | (UserCompleted, UserCompleted)
                | (Interrupt | Interrupted, Interrupt)
                | (Interrupted, Interrupted)
        )
    }

    /// Whether the agent held the floor in this state
    pub fn is_agent_turn(self) -> bool {
        matches!(
            self,
            InteractionState::AgentSpeaking | InteractionState::AgentCompleted
        )
    }

    pub fn is_interruption(self) -> bool {
        matches!(
            self,
            InteractionState::Interrupt | InteractionState::Interrupted
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InteractionState::Unknown => "unknown",
            InteractionState::UserSpeaking => "user_speaking",
            InteractionState::UserCompleted => "user_completed",
            InteractionState::AgentSpeaking => "agent_speaking",
            InteractionState::AgentCompleted => "agent_completed",
            InteractionState::LlmGenerating => "llm_generating",
            InteractionState::Interrupt => "interrupt",
            InteractionState::Interrupted => "interrupted",
        }
    }
}

impl fmt::Display for InteractionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal interaction transition from {from} to {to}")]
pub struct TransitionError {
    pub from: InteractionState,
    pub to: InteractionState,
}
