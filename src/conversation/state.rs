//! Per-sender conversation state.

use serde::{Deserialize, Serialize};

/// What the bot currently expects from a sender.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No pending expectation. Every new sender starts here.
    #[default]
    Idle,
    /// The next plain text message is parsed as a 1-based corpus index.
    AwaitingIndexInput,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::AwaitingIndexInput => "awaiting_index_input",
        };
        write!(f, "{s}")
    }
}
