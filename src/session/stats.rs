use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::messaging::InteractionState;

/// Statistics about a conversation session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: String,

    /// Whether the session is still routing packets
    pub is_active: bool,

    /// When the session started
    pub started_at: DateTime<Utc>,

    /// Total duration in seconds
    pub duration_secs: f64,

    /// Current conversational phase
    pub state: InteractionState,

    /// Packets taken from the inbox and routed
    pub packets_routed: usize,

    /// Audio chunks held by the recorder
    pub audio_chunks: usize,

    /// Where the rendered recording was written, once stopped
    pub recording_path: Option<PathBuf>,
}
