//! Inbound events and the parser that classifies raw message text.

use serde::{Deserialize, Serialize};

/// Opaque conversation identity provided by the platform.
///
/// For Telegram this is the chat id: state is tracked per chat and replies
/// are addressed to the same chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SenderId(pub i64);

impl std::fmt::Display for SenderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reply-keyboard buttons the bot offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuButton {
    Random,
    ByNumber,
    More,
}

impl MenuButton {
    /// Label shown on the keyboard.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Random => "🥠 Random",
            Self::ByNumber => "🔢 By number",
            Self::More => "🍪 More",
        }
    }

    /// Recognise a button press from its text.
    ///
    /// Leading emoji and punctuation are ignored and matching is
    /// case-insensitive, so both `"🔢 By number"` and `"by number"` match.
    pub fn from_label(text: &str) -> Option<Self> {
        let normalized = text
            .trim()
            .trim_start_matches(|c: char| !c.is_alphanumeric())
            .trim()
            .to_lowercase();

        match normalized.as_str() {
            "random" | "random fortune" => Some(Self::Random),
            "by number" => Some(Self::ByNumber),
            "more" | "one more" => Some(Self::More),
            _ => None,
        }
    }
}

/// What the sender asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// `/start`
    Start,
    /// `/help`
    Help,
    /// `/cookie` or `/fortune`
    Fortune,
    /// A recognised keyboard button.
    Menu(MenuButton),
    /// Anything else, including unknown commands.
    PlainText(String),
}

impl EventKind {
    /// Classify message text.
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();

        if let Some(command) = parse_command(trimmed) {
            match command.as_str() {
                "start" => return Self::Start,
                "help" => return Self::Help,
                "cookie" | "fortune" => return Self::Fortune,
                _ => {}
            }
        }

        match MenuButton::from_label(trimmed) {
            Some(button) => Self::Menu(button),
            None => Self::PlainText(trimmed.to_string()),
        }
    }
}

/// Extract the lowercase command name from `/name@bot args`.
fn parse_command(text: &str) -> Option<String> {
    let first = text.split_whitespace().next()?;
    let name = first.strip_prefix('/')?;
    let name = name.split('@').next().unwrap_or(name);
    if name.is_empty() {
        return None;
    }
    Some(name.to_lowercase())
}

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub sender: SenderId,
    pub kind: EventKind,
}

impl InboundEvent {
    pub fn new(sender: SenderId, kind: EventKind) -> Self {
        Self { sender, kind }
    }

    /// Build an event by parsing raw message text.
    pub fn from_text(sender: SenderId, text: &str) -> Self {
        Self::new(sender, EventKind::parse(text))
    }
}
