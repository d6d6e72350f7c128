pub mod config;
pub mod session;
pub mod stats;

pub use config::SessionConfig;
pub use session::ConversationSession;
pub use stats::SessionStats;
