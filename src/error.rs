//! Error types for Farmhand.

use std::time::Duration;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("No credentials configured. Set MASTER_TOKENS or TIER_A/B/C_TOKENS")]
    NoCredentials,

    #[error("Credential {label} is listed more than once")]
    DuplicateCredential { label: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Messaging transport errors.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Login failed: {reason}")]
    Connect { reason: String },

    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Failed to send {command} command: {reason}")]
    SendFailed { command: String, reason: String },

    #[error("Remote command {command} is not available on this channel")]
    CommandUnavailable { command: String },

    #[error("Failed to read channel history: {reason}")]
    History { reason: String },

    #[error("Transport session already closed")]
    Closed,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl TransportError {
    /// Whether this error is the transient rate-limit signal.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

/// Account session failures. Terminal for one account only.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("deposit command failed")]
    DepositFailed,

    #[error("TIMEOUT: session exceeded {budget:?}")]
    Timeout { budget: Duration },

    #[error("session task aborted: {reason}")]
    Aborted { reason: String },
}

/// Report delivery errors.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Report endpoint rejected the payload with HTTP {status}")]
    Rejected { status: u16 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}
