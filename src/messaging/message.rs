use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    User,
    Agent,
}

/// How the caller is currently talking to the agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    Text,
    #[default]
    Audio,
}

/// A message being assembled for the current turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Turn the message belongs to
    pub id: String,
    pub actor: Actor,
    pub mode: InputMode,
    pub contents: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(id: impl Into<String>, actor: Actor, mode: InputMode, text: &str) -> Self {
        Self {
            id: id.into(),
            actor,
            mode,
            contents: vec![text.to_string()],
            created_at: Utc::now(),
        }
    }

    pub fn append(&mut self, text: &str) {
        self.contents.push(text.to_string());
    }

    /// Full text of the message
    ///
    /// Caller fragments are separate transcripts and are joined by a space.
    /// Agent fragments are streamed tokens and are concatenated as-is.
    pub fn text(&self) -> String {
        match self.actor {
            Actor::User => self
                .contents
                .iter()
                .map(|fragment| fragment.trim())
                .filter(|fragment| !fragment.is_empty())
                .collect::<Vec<_>>()
                .join(" "),
            Actor::Agent => self.contents.concat(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_fragments_joined_with_spaces() {
        let mut message = Message::new("t", Actor::User, InputMode::Audio, "hello ");
        message.append(" there");
        message.append("");
        assert_eq!(message.text(), "hello there");
    }

    #[test]
    fn test_agent_fragments_concatenated() {
        let mut message = Message::new("t", Actor::Agent, InputMode::Audio, "Hel");
        message.append("lo, wor");
        message.append("ld.");
        assert_eq!(message.text(), "Hello, world.");
    }
}
