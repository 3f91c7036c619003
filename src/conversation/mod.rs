//! Conversation state machine: events in, next state and reply out.

pub mod engine;
pub mod event;
pub mod prompts;
pub mod reply;
pub mod state;

pub use engine::{ConversationEngine, Decision};
pub use event::{EventKind, InboundEvent, MenuButton, SenderId};
pub use reply::{Affordance, OutboundReply};
pub use state::SessionState;
