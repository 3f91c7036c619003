//! Outbound replies and the UI affordances that accompany them.

use super::event::{MenuButton, SenderId};

/// Buttons to show alongside a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affordance {
    /// "Random" and "By number".
    MainMenu,
    /// "More" on its own row, followed by the main menu.
    More,
}

impl Affordance {
    /// Keyboard layout as rows of buttons.
    pub fn rows(&self) -> Vec<Vec<MenuButton>> {
        match self {
            Self::MainMenu => vec![vec![MenuButton::Random, MenuButton::ByNumber]],
            Self::More => vec![
                vec![MenuButton::More],
                vec![MenuButton::Random, MenuButton::ByNumber],
            ],
        }
    }
}

/// A reply to deliver to one sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundReply {
    pub recipient: SenderId,
    pub body: String,
    pub affordance: Option<Affordance>,
}

impl OutboundReply {
    /// Plain text reply with no buttons.
    pub fn text(recipient: SenderId, body: impl Into<String>) -> Self {
        Self {
            recipient,
            body: body.into(),
            affordance: None,
        }
    }

    pub fn with_affordance(mut self, affordance: Affordance) -> Self {
        self.affordance = Some(affordance);
        self
    }
}
