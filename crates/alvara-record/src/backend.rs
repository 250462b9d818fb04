//! Persistence backends for compliance records
//!
//! A backend stores one document per case together with a monotonically
//! increasing version. Writes carry the version the writer read; a mismatch
//! is reported as [`BackendError::Conflict`] and nothing is written.

use crate::error::BackendError;
use crate::model::{AuditRecord, CaseId};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use fs4::fs_std::FileExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Optimistic concurrency token
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(u64);

impl Version {
    /// Version of the first write
    pub const FIRST: Version = Version(1);

    /// Raw counter
    #[inline]
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }

    /// Version following this one
    #[inline]
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    fn after(current: Option<Version>) -> Self {
        current.map_or(Self::FIRST, Self::next)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Value paired with the version it was read at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned<T> {
    /// Stored version
    pub version: Version,
    /// Stored value
    pub value: T,
}

/// Storage for compliance records
#[async_trait::async_trait]
pub trait RecordBackend: Send + Sync {
    /// Read the latest record of a case
    async fn read(&self, case_id: &CaseId) -> Result<Option<Versioned<AuditRecord>>, BackendError>;

    /// Conditionally write a record
    ///
    /// `expected` is the version returned by the preceding read, `None` when
    /// the record did not exist. Returns the new version.
    async fn write(
        &self,
        record: &AuditRecord,
        expected: Option<Version>,
    ) -> Result<Version, BackendError>;
}

fn conflict(case_id: &CaseId, expected: Option<Version>, actual: Option<Version>) -> BackendError {
    BackendError::Conflict {
        case_id: case_id.clone(),
        expected: expected.map(Version::get),
        actual: actual.map(Version::get),
    }
}

/// In-process backend
#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: DashMap<CaseId, Versioned<AuditRecord>>,
}

impl MemoryBackend {
    /// Create empty backend
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing is stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait::async_trait]
impl RecordBackend for MemoryBackend {
    async fn read(&self, case_id: &CaseId) -> Result<Option<Versioned<AuditRecord>>, BackendError> {
        Ok(self.records.get(case_id).map(|entry| entry.value().clone()))
    }

    async fn write(
        &self,
        record: &AuditRecord,
        expected: Option<Version>,
    ) -> Result<Version, BackendError> {
        let case_id = &record.case_id;
        match self.records.entry(case_id.clone()) {
            Entry::Occupied(mut slot) => {
                let actual = slot.get().version;
                if expected != Some(actual) {
                    return Err(conflict(case_id, expected, Some(actual)));
                }
                let version = actual.next();
                slot.insert(Versioned {
                    version,
                    value: record.clone(),
                });
                Ok(version)
            }
            Entry::Vacant(slot) => {
                if expected.is_some() {
                    return Err(conflict(case_id, expected, None));
                }
                slot.insert(Versioned {
                    version: Version::FIRST,
                    value: record.clone(),
                });
                Ok(Version::FIRST)
            }
        }
    }
}

/// One JSON document per case under a directory
///
/// File names are the hex encoding of the case id, so distinct ids never
/// share a file. Writes hold an advisory lock on `<name>.lock` from the
/// version check until the staged document is renamed into place, which
/// serialises writers across stores and processes sharing the directory.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    root: PathBuf,
}

impl JsonFileBackend {
    /// Use `root` as the storage directory, creating it if needed
    ///
    /// # Errors
    /// - `BackendError::Io` if the directory cannot be created
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, BackendError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| BackendError::io_error(&root, e))?;
        Ok(Self { root })
    }

    /// Storage directory
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Document path of a case
    #[must_use]
    pub fn path_for(&self, case_id: &CaseId) -> PathBuf {
        self.root.join(format!("{}.json", file_stem(case_id)))
    }

    fn lock_path_for(&self, case_id: &CaseId) -> PathBuf {
        self.root.join(format!("{}.lock", file_stem(case_id)))
    }

    fn write_locked(&self, record: &AuditRecord, expected: Option<Version>) -> Result<Version, BackendError> {
        let case_id = &record.case_id;
        let lock_path = self.lock_path_for(case_id);
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|e| BackendError::io_error(&lock_path, e))?;
        lock.lock_exclusive()
            .map_err(|e| BackendError::io_error(&lock_path, e))?;

        let path = self.path_for(case_id);
        let current = match std::fs::read(&path) {
            Ok(bytes) => Some(decode(case_id, &bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(BackendError::io_error(path, e)),
        };
        let actual = current.map(|stored| stored.version);
        if actual != expected {
            return Err(conflict(case_id, expected, actual));
        }

        let stored = Versioned {
            version: Version::after(actual),
            value: record.clone(),
        };
        let body = serde_json::to_vec_pretty(&stored).map_err(|e| BackendError::Corrupt {
            case_id: case_id.clone(),
            message: e.to_string(),
        })?;

        let mut staging =
            NamedTempFile::new_in(&self.root).map_err(|e| BackendError::io_error(&self.root, e))?;
        staging
            .write_all(&body)
            .and_then(|()| staging.as_file().sync_all())
            .map_err(|e| BackendError::io_error(staging.path(), e))?;
        staging
            .persist(&path)
            .map_err(|e| BackendError::io_error(&path, e.error))?;

        // Dropping the handle releases the advisory lock.
        drop(lock);
        Ok(stored.version)
    }
}

fn file_stem(case_id: &CaseId) -> String {
    hex::encode(case_id.as_str())
}

/// Decode a stored document, refusing one that belongs to another case
fn decode(case_id: &CaseId, bytes: &[u8]) -> Result<Versioned<AuditRecord>, BackendError> {
    let stored: Versioned<AuditRecord> =
        serde_json::from_slice(bytes).map_err(|e| BackendError::Corrupt {
            case_id: case_id.clone(),
            message: e.to_string(),
        })?;
    if stored.value.case_id != *case_id {
        return Err(BackendError::Corrupt {
            case_id: case_id.clone(),
            message: format!("document belongs to case {}", stored.value.case_id),
        });
    }
    Ok(stored)
}

#[async_trait::async_trait]
impl RecordBackend for JsonFileBackend {
    async fn read(&self, case_id: &CaseId) -> Result<Option<Versioned<AuditRecord>>, BackendError> {
        let path = self.path_for(case_id);
        match tokio::fs::read(&path).await {
            Ok(bytes) => decode(case_id, &bytes).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(BackendError::io_error(path, e)),
        }
    }

    async fn write(
        &self,
        record: &AuditRecord,
        expected: Option<Version>,
    ) -> Result<Version, BackendError> {
        let backend = self.clone();
        let owned = record.clone();
        let version = tokio::task::spawn_blocking(move || backend.write_locked(&owned, expected))
            .await
            .map_err(|e| BackendError::io_error(&self.root, std::io::Error::other(e)))??;

        tracing::debug!(case_id = %record.case_id, %version, "record written");
        Ok(version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CaseKind;

    fn record(id: &str) -> AuditRecord {
        AuditRecord::skeleton(CaseId::new(id), CaseKind::Licensing)
    }

    #[tokio::test]
    async fn memory_backend_versions_writes() {
        let backend = MemoryBackend::new();
        let v1 = backend.write(&record("c1"), None).await.unwrap();
        assert_eq!(v1, Version::FIRST);

        let v2 = backend.write(&record("c1"), Some(v1)).await.unwrap();
        assert_eq!(v2.get(), 2);

        let read = backend.read(&CaseId::new("c1")).await.unwrap().unwrap();
        assert_eq!(read.version, v2);
    }

    #[tokio::test]
    async fn memory_backend_rejects_stale_version() {
        let backend = MemoryBackend::new();
        let v1 = backend.write(&record("c1"), None).await.unwrap();
        backend.write(&record("c1"), Some(v1)).await.unwrap();

        let err = backend.write(&record("c1"), Some(v1)).await.unwrap_err();
        assert!(matches!(
            err,
            BackendError::Conflict {
                expected: Some(1),
                actual: Some(2),
                ..
            }
        ));
        let err = backend.write(&record("c1"), None).await.unwrap_err();
        assert!(matches!(err, BackendError::Conflict { expected: None, .. }));
    }

    #[tokio::test]
    async fn json_backend_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonFileBackend::open(dir.path()).await.unwrap();
        let mut rec = record("2024/0153");
        rec.summary = "Vistoria agendada".to_string();
        let version = backend.write(&rec, None).await.unwrap();

        let reopened = JsonFileBackend::open(dir.path()).await.unwrap();
        let read = reopened.read(&rec.case_id).await.unwrap().unwrap();
        assert_eq!(read.version, version);
        assert_eq!(read.value.summary, "Vistoria agendada");
        assert!(dir.path().join("323032342f30313533.json").exists());
    }

    #[tokio::test]
    async fn json_backend_keeps_similar_ids_apart() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonFileBackend::open(dir.path()).await.unwrap();
        backend.write(&record("2024/0153"), None).await.unwrap();

        for other in ["2024_0153", "2024.0153", "2024-0153"] {
            assert!(backend.read(&CaseId::new(other)).await.unwrap().is_none(), "{other}");
        }

        let mut dotted = record("2024.0153");
        dotted.summary = "outro processo".to_string();
        assert_eq!(backend.write(&dotted, None).await.unwrap(), Version::FIRST);

        let slashed = backend.read(&CaseId::new("2024/0153")).await.unwrap().unwrap();
        assert_eq!(slashed.value.case_id, CaseId::new("2024/0153"));
        assert_eq!(slashed.value.summary, "");
        let read = backend.read(&CaseId::new("2024.0153")).await.unwrap().unwrap();
        assert_eq!(read.value.summary, "outro processo");
    }

    #[tokio::test]
    async fn json_backend_refuses_document_of_another_case() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonFileBackend::open(dir.path()).await.unwrap();
        backend.write(&record("c1"), None).await.unwrap();
        let c2 = CaseId::new("c2");
        std::fs::copy(backend.path_for(&CaseId::new("c1")), backend.path_for(&c2)).unwrap();

        let err = backend.read(&c2).await.unwrap_err();
        assert!(matches!(err, BackendError::Corrupt { .. }));
        let err = backend.write(&record("c2"), Some(Version::FIRST)).await.unwrap_err();
        assert!(matches!(err, BackendError::Corrupt { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn json_backends_on_one_directory_never_both_win() {
        let dir = tempfile::tempdir().unwrap();
        for trial in 0..50 {
            let first = JsonFileBackend::open(dir.path()).await.unwrap();
            let second = JsonFileBackend::open(dir.path()).await.unwrap();
            let rec = record(&format!("case-{trial}"));

            let (a, b) = tokio::join!(
                tokio::spawn({
                    let rec = rec.clone();
                    async move { first.write(&rec, None).await }
                }),
                tokio::spawn({
                    let rec = rec.clone();
                    async move { second.write(&rec, None).await }
                }),
            );
            let wins = [a.unwrap(), b.unwrap()].iter().filter(|r| r.is_ok()).count();
            assert_eq!(wins, 1, "trial {trial}");
        }
    }

    #[tokio::test]
    async fn json_backend_detects_conflict() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonFileBackend::open(dir.path()).await.unwrap();
        backend.write(&record("c1"), None).await.unwrap();
        let err = backend.write(&record("c1"), None).await.unwrap_err();
        assert!(matches!(err, BackendError::Conflict { .. }));
    }

    #[tokio::test]
    async fn json_backend_reports_corrupt_document() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonFileBackend::open(dir.path()).await.unwrap();
        std::fs::write(backend.path_for(&CaseId::new("c1")), b"{not json").unwrap();
        let err = backend.read(&CaseId::new("c1")).await.unwrap_err();
        assert!(matches!(err, BackendError::Corrupt { .. }));
    }
}
