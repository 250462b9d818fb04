//! Error types for retrieval

use crate::retry::{is_capacity_status, mentions_quota};

/// Errors raised while querying or maintaining the regulation corpus
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    /// Transport failure
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Corpus answered with a non-success status
    #[error("corpus returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, possibly truncated
        body: String,
    },

    /// Response body did not decode
    #[error("invalid corpus response: {0}")]
    Decode(String),

    /// Regulation id not present
    #[error("regulation not found: {0}")]
    NotFound(String),

    /// Corpus not configured
    #[error("corpus configuration error: {0}")]
    Config(String),
}

impl RetrievalError {
    /// Create status error, truncating long bodies
    pub fn status_error(status: u16, body: impl Into<String>) -> Self {
        let mut body = body.into();
        if body.len() > 512 {
            let cut = (0..=512).rev().find(|&i| body.is_char_boundary(i)).unwrap_or(0);
            body.truncate(cut);
        }
        Self::Status { status, body }
    }

    /// Check if a retry may succeed
    ///
    /// Same rule as model calls: quota exhaustion and overload, by status
    /// code or by message text.
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

/// Result type alias for retrieval operations
pub type RetrievalResult<T> = Result<T, RetrievalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_body_is_truncated_on_char_boundary() {
        let err = RetrievalError::status_error(500, "ç".repeat(400));
        let RetrievalError::Status { body, .. } = err else {
            panic!("expected status error");
        };
        assert!(body.len() <= 512);
        assert!(body.chars().all(|c| c == 'ç'));
    }

    #[test]
    fn quota_and_overload_are_recoverable() {
        assert!(RetrievalError::status_error(503, "").is_recoverable());
        assert!(RetrievalError::status_error(429, "").is_recoverable());
        assert!(RetrievalError::status_error(400, "rate limit exceeded").is_recoverable());
        assert!(!RetrievalError::status_error(502, "bad gateway").is_recoverable());
        assert!(!RetrievalError::status_error(400, "bad tsquery").is_recoverable());
        assert!(!RetrievalError::NotFound("x".into()).is_recoverable());
    }
}
