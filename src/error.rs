//! Crate-level error type and host error reporting
//!
//! Every failure is local to the message being processed. Errors reach the
//! flow engine through its error hook as sanitized text, never by terminating
//! the process.

use crate::transport::http::HttpError;
use crate::transport::mqtt::MqttError;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Main error type for relay and storage node operations
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("MQTT error: {0}")]
    Mqtt(#[from] MqttError),

    #[error("HTTP error: {0}")]
    Http(#[from] HttpError),

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl RelayError {
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn storage<S: Into<String>>(message: S) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Text handed to the host error hook
    pub fn to_report(&self) -> String {
        let message = match self {
            RelayError::InvalidInput { message } => message.clone(),
            RelayError::Storage { message } => message.clone(),
            other => other.to_string(),
        };
        sanitize_error_message(&message)
    }
}

static SECRET_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(password|token|key|secret|jwt)[=:]\s*\S+").expect("static regex")
});

static BEARER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)bearer\s+\S+").expect("static regex"));

const MAX_REPORT_LEN: usize = 500;

/// Redact credentials and cap the length of a message shown to the flow
pub fn sanitize_error_message(message: &str) -> String {
    let mut sanitized = SECRET_PATTERN
        .replace_all(message, "${1}=***")
        .to_string();
    sanitized = BEARER_PATTERN
        .replace_all(&sanitized, "Bearer ***")
        .to_string();

    if sanitized.len() > MAX_REPORT_LEN {
        let truncate_suffix = "...[truncated]";
        let mut cut = MAX_REPORT_LEN - truncate_suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized = format!("{}{}", &sanitized[..cut], truncate_suffix);
    }

    sanitized
}

/// Result type for relay operations
pub type RelayResult<T> = Result<T, RelayError>;
