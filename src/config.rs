//! Configuration types, read from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::channels::telegram::DEFAULT_API_BASE;
use crate::error::ConfigError;
use crate::ingress::IngressMode;
use crate::session::DEFAULT_CAPACITY;

/// Bot configuration.
#[derive(Debug)]
pub struct BotConfig {
    /// Bot API credential. Also the webhook path segment.
    pub bot_token: SecretString,
    /// How updates reach the service.
    pub mode: IngressMode,
    /// HTTP listen port for liveness (and the webhook in push mode).
    pub port: u16,
    /// Externally reachable host used to build the webhook URL.
    pub webhook_host: Option<String>,
    /// Optional value the platform must echo in a header on webhook calls.
    pub webhook_secret: Option<SecretString>,
    /// Fortune corpus file.
    pub corpus_path: PathBuf,
    /// Bot API base URL.
    pub api_base: String,
    /// Long-poll timeout in seconds.
    pub poll_timeout_secs: u64,
    /// Sessions idle this long are pruned.
    pub session_idle_timeout: Duration,
    /// Maximum number of tracked senders.
    pub session_capacity: usize,
    /// How often idle sessions are pruned.
    pub prune_interval: Duration,
}

impl BotConfig {
    /// Defaults for everything except the token.
    pub fn new(bot_token: SecretString) -> Self {
        Self {
            bot_token,
            mode: IngressMode::Poll,
            port: 8080,
            webhook_host: None,
            webhook_secret: None,
            corpus_path: PathBuf::from("predictions.txt"),
            api_base: DEFAULT_API_BASE.to_string(),
            poll_timeout_secs: 30,
            session_idle_timeout: Duration::from_secs(3600), // 1 hour
            session_capacity: DEFAULT_CAPACITY,
            prune_interval: Duration::from_secs(600), // 10 minutes
        }
    }

    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, which maps a variable name to
    /// its value. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let token = get("BOT_TOKEN")
            .or_else(|| get("TELEGRAM_BOT_TOKEN"))
            .ok_or_else(|| ConfigError::MissingEnvVar("BOT_TOKEN".into()))?;

        let mut config = Self::new(SecretString::from(token));

        if let Some(mode) = get("BOT_MODE") {
            config.mode = mode.parse().map_err(|message| ConfigError::InvalidValue {
                key: "BOT_MODE".into(),
                message,
            })?;
        }
        if let Some(port) = get("PORT") {
            config.port = parse_value("PORT", &port)?;
        }
        config.webhook_host = get("WEBHOOK_HOST");
        config.webhook_secret = get("WEBHOOK_SECRET").map(SecretString::from);
        if let Some(path) = get("PREDICTIONS_FILE") {
            config.corpus_path = PathBuf::from(path);
        }
        if let Some(base) = get("TELEGRAM_API_BASE") {
            config.api_base = base;
        }
        if let Some(timeout) = get("POLL_TIMEOUT_SECS") {
            config.poll_timeout_secs = parse_value("POLL_TIMEOUT_SECS", &timeout)?;
        }
        if let Some(secs) = get("SESSION_IDLE_TIMEOUT_SECS") {
            config.session_idle_timeout =
                Duration::from_secs(parse_value("SESSION_IDLE_TIMEOUT_SECS", &secs)?);
        }
        if let Some(capacity) = get("SESSION_CAPACITY") {
            config.session_capacity = parse_value("SESSION_CAPACITY", &capacity)?;
        }

        if config.mode == IngressMode::Webhook && config.webhook_host.is_none() {
            return Err(ConfigError::MissingRequired {
                key: "WEBHOOK_HOST".into(),
                hint: "Webhook mode needs the public hostname the platform can reach.".into(),
            });
        }

        Ok(config)
    }

    /// Public webhook URL: `https://{host}/{token}`.
    ///
    /// A host given with an explicit scheme is used as-is.
    pub fn webhook_url(&self) -> Option<String> {
        let host = self.webhook_host.as_deref()?.trim_end_matches('/');
        let base = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("https://{host}")
        };
        Some(format!("{base}/{}", self.bot_token.expose_secret()))
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("{raw:?}: {e}"),
    })
}
