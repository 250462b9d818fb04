//! Error types for the compliance record
//!
//! Persistence failures are always surfaced: a lost audit finding is never
//! acceptable, so nothing in this crate swallows a backend error.

use crate::model::{CaseId, ItemStatus, SectionName};
use std::path::PathBuf;

/// Errors raised by a [`RecordBackend`](crate::backend::RecordBackend)
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Stored version moved between read and write
    #[error("version conflict for case {case_id}: expected {expected:?}, found {actual:?}")]
    Conflict {
        /// Case whose record changed
        case_id: CaseId,
        /// Version the writer read
        expected: Option<u64>,
        /// Version currently stored
        actual: Option<u64>,
    },

    /// IO failure reaching the backing store
    #[error("io error on {path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Stored document could not be decoded
    #[error("corrupt record for case {case_id}: {message}")]
    Corrupt {
        /// Case whose document is unreadable
        case_id: CaseId,
        /// Decoder message
        message: String,
    },

    /// Backend unreachable
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl BackendError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors raised by the [`AuditStateStore`](crate::store::AuditStateStore)
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// Persistence layer failure
    #[error("persistence failure: {0}")]
    Backend(#[from] BackendError),

    /// Key outside the section's vocabulary
    #[error("unknown key '{key}' for section {section}")]
    UnknownKey {
        /// Addressed section
        section: SectionName,
        /// Rejected key
        key: String,
    },

    /// Status not valid for the addressed entry kind
    #[error("status {status} is not valid for {section}.{key}")]
    InvalidStatus {
        /// Addressed section
        section: SectionName,
        /// Addressed key
        key: String,
        /// Rejected status
        status: ItemStatus,
    },

    /// Unrecognised section name
    #[error("unknown section: {0}")]
    UnknownSection(String),

    /// Unrecognised compliance status label
    #[error("unknown compliance status: {0}")]
    UnknownComplianceStatus(String),

    /// Unrecognised wizard step name
    #[error("unknown wizard step: {0}")]
    UnknownStep(String),
}

impl RecordError {
    /// Check if error is an optimistic concurrency conflict
    #[inline]
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Backend(BackendError::Conflict { .. }))
    }

    /// Check if error came from the persistence layer
    #[inline]
    #[must_use]
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Backend(_))
    }
}

/// Result type alias for store operations
pub type RecordResult<T> = Result<T, RecordError>;
