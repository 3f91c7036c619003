//! Telegram channel: Bot API client over plain HTTPS.
//!
//! Implements [`Messenger`] with `getUpdates` long-polling, `sendMessage`
//! with reply keyboards, and `setWebhook`/`deleteWebhook` for push mode.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use super::channel::Messenger;
use super::update::Update;
use crate::conversation::{Affordance, OutboundReply};
use crate::error::{ChannelError, DecodeError};

/// Public Bot API endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Extra slack on top of the long-poll timeout before the HTTP request gives up.
const POLL_REQUEST_SLACK: Duration = Duration::from_secs(10);

/// How long to wait for a TCP/TLS connection to the Bot API.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Request timeout for every method except `getUpdates`.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Envelope every Bot API method responds with.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i64>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

/// Telegram channel: talks to the Bot API with a bot token.
pub struct TelegramChannel {
    bot_token: SecretString,
    api_base: String,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(bot_token: SecretString) -> Self {
        Self::with_api_base(bot_token, DEFAULT_API_BASE)
    }

    /// Point the client at a different Bot API server (a self-hosted one,
    /// or a fake in tests).
    pub fn with_api_base(bot_token: SecretString, api_base: impl Into<String>) -> Self {
        Self {
            bot_token,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            client: reqwest::Client::builder()
                .connect_timeout(CONNECT_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }

    /// Method URL. Contains the token, so it must never be logged.
    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{method}",
            self.api_base,
            self.bot_token.expose_secret()
        )
    }

    /// Call a Bot API method and unwrap its `result`.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
        timeout: Option<Duration>,
    ) -> Result<T, ChannelError> {
        let request = self
            .client
            .post(self.api_url(method))
            .json(body)
            .timeout(timeout.unwrap_or(REQUEST_TIMEOUT));

        // without_url() keeps the token out of error messages
        let resp = request
            .send()
            .await
            .map_err(|e| transport_error(method, e.without_url().to_string()))?;

        let status = resp.status();
        let envelope: ApiResponse<T> = resp.json().await.map_err(|e| {
            transport_error(
                method,
                format!("unreadable response ({status}): {}", e.without_url()),
            )
        })?;

        if envelope.ok {
            if let Some(result) = envelope.result {
                return Ok(result);
            }
        }

        if envelope.error_code == Some(429) {
            return Err(ChannelError::RateLimited {
                name: "telegram".into(),
                retry_after: envelope
                    .parameters
                    .and_then(|p| p.retry_after)
                    .map(Duration::from_secs),
            });
        }

        Err(ChannelError::ApiError {
            name: "telegram".into(),
            method: method.to_string(),
            description: envelope
                .description
                .unwrap_or_else(|| format!("HTTP {status}")),
        })
    }

    /// Send a text message, splitting bodies over Telegram's 4096 char
    /// limit. The keyboard is attached to the last chunk only.
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        affordance: Option<Affordance>,
    ) -> Result<(), ChannelError> {
        let chunks = split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH);
        let last = chunks.len() - 1;

        for (i, chunk) in chunks.iter().enumerate() {
            let mut body = serde_json::json!({
                "chat_id": chat_id,
                "text": chunk,
            });
            if i == last {
                if let Some(affordance) = affordance {
                    body["reply_markup"] = keyboard_markup(affordance);
                }
            }
            let _: serde_json::Value = self.call("sendMessage", &body, None).await?;
        }
        Ok(())
    }
}

// ── Messenger trait implementation ──────────────────────────────────

#[async_trait]
impl Messenger for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>, ChannelError> {
        let body = serde_json::json!({
            "offset": offset,
            "timeout": timeout_secs,
            "allowed_updates": ["message"]
        });
        let timeout = Duration::from_secs(timeout_secs) + POLL_REQUEST_SLACK;
        let batch: Vec<serde_json::Value> = self.call("getUpdates", &body, Some(timeout)).await?;
        Ok(decode_batch(batch))
    }

    async fn send_reply(&self, reply: &OutboundReply) -> Result<(), ChannelError> {
        self.send_message(reply.recipient.0, &reply.body, reply.affordance)
            .await
    }

    async fn set_webhook(&self, url: &str, secret: Option<&str>) -> Result<(), ChannelError> {
        let mut body = serde_json::json!({
            "url": url,
            "allowed_updates": ["message"]
        });
        if let Some(secret) = secret {
            body["secret_token"] = serde_json::Value::String(secret.to_string());
        }
        let _: bool = self.call("setWebhook", &body, None).await?;
        tracing::info!("Telegram webhook registered");
        Ok(())
    }

    async fn delete_webhook(&self) -> Result<(), ChannelError> {
        let body = serde_json::json!({ "drop_pending_updates": false });
        let _: bool = self.call("deleteWebhook", &body, None).await?;
        tracing::info!("Telegram webhook removed");
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        self.call::<serde_json::Value>("getMe", &serde_json::json!({}), None)
            .await
            .map(|_| ())
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn transport_error(method: &str, reason: String) -> ChannelError {
    if method == "getUpdates" {
        ChannelError::ReceiveFailed {
            name: "telegram".into(),
            reason,
        }
    } else {
        ChannelError::SendFailed {
            name: "telegram".into(),
            reason: format!("{method}: {reason}"),
        }
    }
}

/// Decode a `getUpdates` batch one element at a time.
///
/// An element that does not decode is replaced by an empty update with the
/// same `update_id`, so the poll offset still moves past it and the rest of
/// the batch is handled. Elements without a usable `update_id` are dropped.
fn decode_batch(batch: Vec<serde_json::Value>) -> Vec<Update> {
    batch
        .into_iter()
        .filter_map(|value| {
            let update_id = value.get("update_id").and_then(serde_json::Value::as_i64);
            match Update::deserialize(&value) {
                Ok(update) => Some(update),
                Err(e) => {
                    let e = DecodeError::from(e);
                    warn!(update_id = ?update_id, error = %e, "Skipping undecodable update");
                    update_id.map(|update_id| Update {
                        update_id,
                        message: None,
                    })
                }
            }
        })
        .collect()
}

/// Render an affordance as a `ReplyKeyboardMarkup`.
fn keyboard_markup(affordance: Affordance) -> serde_json::Value {
    let keyboard: Vec<Vec<serde_json::Value>> = affordance
        .rows()
        .iter()
        .map(|row| {
            row.iter()
                .map(|button| serde_json::json!({ "text": button.label() }))
                .collect()
        })
        .collect();

    serde_json::json!({
        "keyboard": keyboard,
        "resize_keyboard": true
    })
}

/// Split a message into chunks that fit Telegram's character limit.
/// Tries to split on newlines, then spaces, then hard-cuts at a char boundary.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut limit = max_len;
        while !remaining.is_char_boundary(limit) {
            limit -= 1;
        }

        let chunk = &remaining[..limit];
        let split_at = chunk
            .rfind('\n')
            .or_else(|| chunk.rfind(' '))
            .unwrap_or(limit);

        // Don't split at position 0 (infinite loop guard)
        let split_at = if split_at == 0 { limit } else { split_at };

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    chunks
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::SenderId;

    fn channel(token: &str) -> TelegramChannel {
        TelegramChannel::new(SecretString::from(token))
    }

    #[test]
    fn telegram_channel_name() {
        assert_eq!(channel("fake-token").name(), "telegram");
    }

    #[test]
    fn telegram_api_url() {
        assert_eq!(
            channel("123:ABC").api_url("getMe"),
            "https://api.telegram.org/bot123:ABC/getMe"
        );
    }

    #[test]
    fn telegram_api_url_custom_base() {
        let ch = TelegramChannel::with_api_base(SecretString::from("t"), "http://127.0.0.1:8081/");
        assert_eq!(ch.api_url("getUpdates"), "http://127.0.0.1:8081/bott/getUpdates");
    }

    #[test]
    fn main_menu_markup() {
        let markup = keyboard_markup(Affordance::MainMenu);
        assert_eq!(markup["resize_keyboard"], true);
        let rows = markup["keyboard"].as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0]["text"], "🥠 Random");
        assert_eq!(rows[0][1]["text"], "🔢 By number");
    }

    #[test]
    fn more_markup_puts_more_first() {
        let markup = keyboard_markup(Affordance::More);
        let rows = markup["keyboard"].as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0]["text"], "🍪 More");
    }

    #[test]
    fn api_error_envelope_parses() {
        let json = r#"{"ok":false,"error_code":429,"description":"Too Many Requests","parameters":{"retry_after":3}}"#;
        let env: ApiResponse<serde_json::Value> = serde_json::from_str(json).unwrap();
        assert!(!env.ok);
        assert_eq!(env.error_code, Some(429));
        assert_eq!(env.parameters.unwrap().retry_after, Some(3));
    }

    #[test]
    fn transport_errors_are_classified_by_direction() {
        assert!(matches!(
            transport_error("getUpdates", "boom".into()),
            ChannelError::ReceiveFailed { .. }
        ));
        assert!(matches!(
            transport_error("sendMessage", "boom".into()),
            ChannelError::SendFailed { .. }
        ));
    }

    #[test]
    fn decode_batch_skips_bad_element_but_keeps_its_id() {
        let batch = vec![
            serde_json::to_value(Update::text(1, 42, "/start")).unwrap(),
            serde_json::json!({
                "update_id": 2,
                "message": {"message_id": 9, "date": 1, "chat": {"id": "not-a-number"}, "text": "hi"}
            }),
            serde_json::to_value(Update::text(3, 42, "/cookie")).unwrap(),
        ];

        let updates = decode_batch(batch);
        let ids: Vec<i64> = updates.iter().map(|u| u.update_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(updates[0].to_event().is_some());
        assert!(updates[1].to_event().is_none());
        assert!(updates[2].to_event().is_some());
    }

    #[test]
    fn decode_batch_drops_element_without_id() {
        let updates = decode_batch(vec![serde_json::json!({"message": {}}), serde_json::json!(17)]);
        assert!(updates.is_empty());
    }

    // ── Network error tests (expected to fail with no server) ───────

    #[tokio::test]
    async fn send_reply_to_unreachable_server_is_send_failed() {
        let ch = TelegramChannel::with_api_base(SecretString::from("secret-token"), "http://127.0.0.1:1");
        let reply = OutboundReply::text(SenderId(1), "hi");

        let err = ch.send_reply(&reply).await.unwrap_err();
        assert!(matches!(err, ChannelError::SendFailed { .. }));
        assert!(
            !err.to_string().contains("secret-token"),
            "token leaked into error: {err}"
        );
    }

    #[tokio::test]
    async fn get_updates_unreachable_is_receive_failed() {
        let ch = TelegramChannel::with_api_base(SecretString::from("t"), "http://127.0.0.1:1");
        let err = ch.get_updates(0, 0).await.unwrap_err();
        assert!(matches!(err, ChannelError::ReceiveFailed { .. }));
    }

    #[tokio::test]
    async fn health_check_unreachable_is_startup_failed() {
        let ch = TelegramChannel::with_api_base(SecretString::from("t"), "http://127.0.0.1:1");
        assert!(matches!(
            ch.health_check().await,
            Err(ChannelError::StartupFailed { .. })
        ));
    }

    // ── Message splitting tests ─────────────────────────────────────

    #[test]
    fn split_message_short() {
        let chunks = split_message("Hello", 4096);
        assert_eq!(chunks, vec!["Hello"]);
    }

    #[test]
    fn split_message_exact_limit() {
        let msg = "a".repeat(4096);
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].len(), 4096);
    }

    #[test]
    fn split_message_over_limit_on_newline() {
        let msg = format!("{}\n{}", "a".repeat(2000), "b".repeat(3000));
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks, vec!["a".repeat(2000), "b".repeat(3000)]);
    }

    #[test]
    fn split_message_no_good_split_point() {
        let msg = "a".repeat(5000);
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 4096);
        assert_eq!(chunks[1].len(), 904);
    }

    #[test]
    fn split_message_respects_char_boundaries() {
        // 'ж' is two bytes, so byte 4095 falls inside a character
        let msg = "ж".repeat(3000);
        let chunks = split_message(&msg, 4095);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chars().count(), 2047);
        assert_eq!(chunks.concat(), msg);
    }
}
