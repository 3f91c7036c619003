//! Telegram Bot API update payloads and their decoding into inbound events.
//!
//! Only the fields the bot reads are modelled; everything else in the
//! payload is ignored by serde.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::conversation::{InboundEvent, SenderId};
use crate::error::DecodeError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(default)]
    pub date: i64,
    pub chat: Chat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<User>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
}

impl Update {
    /// Parse a raw JSON body.
    pub fn from_slice(body: &[u8]) -> Result<Self, DecodeError> {
        Ok(serde_json::from_slice(body)?)
    }

    /// Build a text-message update. Handy for tests and local tooling.
    pub fn text(update_id: i64, chat_id: i64, text: &str) -> Self {
        Self {
            update_id,
            message: Some(Message {
                message_id: update_id,
                date: Utc::now().timestamp(),
                chat: Chat { id: chat_id },
                from: Some(User {
                    id: chat_id,
                    username: None,
                    first_name: None,
                }),
                text: Some(text.to_string()),
            }),
        }
    }

    /// The inbound event carried by this update, if it is a text message.
    /// Edits, stickers, joins and other update kinds yield `None`.
    pub fn to_event(&self) -> Option<InboundEvent> {
        let message = self.message.as_ref()?;
        let text = message.text.as_deref()?;
        Some(InboundEvent::from_text(SenderId(message.chat.id), text))
    }

    /// When the message was sent, if present and valid.
    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        let date = self.message.as_ref()?.date;
        if date == 0 {
            return None;
        }
        DateTime::from_timestamp(date, 0)
    }
}
