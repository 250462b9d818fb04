//! Lookup of cases by their human-readable protocol number

use crate::error::BackendError;
use crate::model::{CaseId, CaseKind};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

/// Case resolved from a protocol number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseRef {
    /// Internal identifier
    pub case_id: CaseId,
    /// Protocol number as registered
    pub protocol: String,
    /// Case variant
    #[serde(default)]
    pub case_kind: CaseKind,
}

/// Keep only ASCII digits, so `2024/0153` and `20240153` compare equal
#[must_use]
pub fn protocol_digits(protocol: &str) -> String {
    protocol.chars().filter(char::is_ascii_digit).collect()
}

/// Resolves protocol numbers to cases
#[async_trait::async_trait]
pub trait CaseDirectory: Send + Sync {
    /// Find the case whose protocol has the same digits
    async fn resolve(&self, protocol: &str) -> Result<Option<CaseRef>, BackendError>;
}

/// Directory backed by a fixed list
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    cases: RwLock<Vec<CaseRef>>,
}

impl MemoryDirectory {
    /// Create empty directory
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create directory holding `cases`
    #[must_use]
    pub fn with_cases(cases: impl IntoIterator<Item = CaseRef>) -> Self {
        Self {
            cases: RwLock::new(cases.into_iter().collect()),
        }
    }

    /// Register a case
    pub fn register(&self, case: CaseRef) {
        if let Ok(mut cases) = self.cases.write() {
            cases.push(case);
        }
    }
}

#[async_trait::async_trait]
impl CaseDirectory for MemoryDirectory {
    async fn resolve(&self, protocol: &str) -> Result<Option<CaseRef>, BackendError> {
        let wanted = protocol_digits(protocol);
        if wanted.is_empty() {
            return Ok(None);
        }
        let cases = self
            .cases
            .read()
            .map_err(|_| BackendError::Unavailable("case directory lock poisoned".to_string()))?;
        Ok(cases
            .iter()
            .find(|case| protocol_digits(&case.protocol) == wanted)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> MemoryDirectory {
        MemoryDirectory::with_cases([CaseRef {
            case_id: CaseId::new("a1b2"),
            protocol: "2024/0153".to_string(),
            case_kind: CaseKind::HabiteSe,
        }])
    }

    #[tokio::test]
    async fn matches_on_digits_only() {
        let dir = directory();
        let found = dir.resolve("nº 2024.0153").await.unwrap().unwrap();
        assert_eq!(found.case_id, CaseId::new("a1b2"));
        assert_eq!(found.case_kind, CaseKind::HabiteSe);
        assert!(dir.resolve("2024/0154").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn digitless_protocol_never_matches() {
        let dir = directory();
        dir.register(CaseRef {
            case_id: CaseId::new("blank"),
            protocol: "s/n".to_string(),
            case_kind: CaseKind::Licensing,
        });
        assert!(dir.resolve("s/n").await.unwrap().is_none());
    }
}
