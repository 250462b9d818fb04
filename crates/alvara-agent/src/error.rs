//! Error types for the audit agent

use crate::state_machine::AgentState;
use alvara_retrieval::retry::{is_capacity_status, mentions_quota};
use std::path::PathBuf;

/// Failures talking to the generative model
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// Transport failure
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success answer from the model service
    #[error("model service returned {status}: {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Body or error message
        message: String,
    },

    /// Stream broke off or carried an error payload
    #[error("stream error: {0}")]
    Stream(String),

    /// Payload could not be decoded
    #[error("decode error: {0}")]
    Decode(String),

    /// Client misconfigured
    #[error("model configuration error: {0}")]
    Config(String),
}

impl ModelError {
    /// Check if a retry may succeed
    ///
    /// Quota exhaustion and overload are recoverable, whether reported by
    /// status code or only in the message text.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        let status = match self {
            Self::Status { status, .. } => Some(*status),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        };
        status.is_some_and(is_capacity_status) || mentions_quota(&self.to_string())
    }
}

/// Failures of a single agent exchange
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Transition outside the turn lifecycle
    #[error("illegal transition {from:?} -> {to:?}")]
    IllegalTransition {
        /// Current state
        from: AgentState,
        /// Requested state
        to: AgentState,
    },

    /// Model failure after retries
    #[error("{0}")]
    Model(#[from] ModelError),

    /// Exchange exceeded the turn deadline
    #[error("turn timed out")]
    Timeout,
}

impl AgentError {
    /// Check if error is a turn timeout
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

/// Configuration loading failures
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File unreadable
    #[error("cannot read config {path}: {source}")]
    Io {
        /// Config path
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid TOML
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Required setting absent
    #[error("missing setting: {0}")]
    Missing(&'static str),
}

/// Failures inside a tool handler
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// Arguments from the model are unusable
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    /// Record store rejected the operation
    #[error(transparent)]
    Record(#[from] alvara_record::RecordError),

    /// Case lookup failed
    #[error(transparent)]
    Directory(#[from] alvara_record::BackendError),
}
