//! Error types for the fortune bot.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors. All of these are fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Corpus loading and lookup errors.
///
/// Load failures are recovered inside [`crate::corpus::CorpusStore`]; only
/// `IndexOutOfRange` reaches callers.
#[derive(Debug, thiserror::Error)]
pub enum CorpusError {
    #[error("Corpus file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Failed to read corpus file {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corpus file {} has no entries", path.display())]
    Empty { path: PathBuf },

    #[error("Index {index} out of range, valid range is 1..={len}")]
    IndexOutOfRange { index: i64, len: usize },
}

/// Numeric input typed by a sender that cannot be used as a corpus index.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputParseError {
    #[error("not a whole number: {0:?}")]
    NotANumber(String),

    #[error("{value} is outside 1..={len}")]
    OutOfRange { value: String, len: usize },
}

/// Transport errors talking to the messaging platform.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Failed to receive updates on channel {name}: {reason}")]
    ReceiveFailed { name: String, reason: String },

    #[error("Rate limited on channel {name}, retry after {retry_after:?}")]
    RateLimited {
        name: String,
        retry_after: Option<Duration>,
    },

    #[error("Channel {name} API call {method} rejected: {description}")]
    ApiError {
        name: String,
        method: String,
        description: String,
    },
}

/// Inbound payload could not be decoded.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Malformed update payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
