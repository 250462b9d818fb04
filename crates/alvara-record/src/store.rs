//! Merge-safe access to compliance records
//!
//! Every mutation is one transaction: take the per-case lock, read the latest
//! stored version, apply the change, write back conditioned on that version.
//! Nothing is merged against a copy held across an await point, and nothing
//! is retried here; a conflict goes back to the caller.

use crate::backend::RecordBackend;
use crate::error::RecordResult;
use crate::findings::{Findings, SkippedFinding};
use crate::model::{
    AuditRecord, CaseId, CaseKind, ComplianceStatus, ItemPatch, SectionName, StepName,
};
use crate::parser::ParsedAudit;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Summary stamped on a manually started audit
pub const MANUAL_START_SUMMARY: &str = "Auditoria Manual Iniciada pelo Analista.";

/// Outcome of a tool-call save
#[derive(Debug, Clone)]
pub struct VerdictOutcome {
    /// Record as written
    pub record: AuditRecord,
    /// Findings merged into matrices
    pub applied: usize,
    /// Findings ignored, from extraction or merge
    pub skipped: Vec<SkippedFinding>,
}

/// Single point of truth for reading and merge-writing records
pub struct AuditStateStore {
    backend: Arc<dyn RecordBackend>,
    locks: DashMap<CaseId, Arc<Mutex<()>>>,
}

impl std::fmt::Debug for AuditStateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditStateStore")
            .field("cases_locked", &self.locks.len())
            .finish_non_exhaustive()
    }
}

impl AuditStateStore {
    /// Create store over a backend
    #[must_use]
    pub fn new(backend: Arc<dyn RecordBackend>) -> Self {
        Self {
            backend,
            locks: DashMap::new(),
        }
    }

    fn lock_for(&self, case_id: &CaseId) -> Arc<Mutex<()>> {
        self.locks.entry(case_id.clone()).or_default().clone()
    }

    /// Forget the case lock once no other transaction holds or awaits it
    fn release(&self, case_id: &CaseId, lock: Arc<Mutex<()>>) {
        drop(lock);
        self.locks.remove_if(case_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    /// Read the latest record
    ///
    /// # Errors
    /// - `RecordError::Backend` on persistence failure
    pub async fn get(&self, case_id: &CaseId) -> RecordResult<Option<AuditRecord>> {
        Ok(self.backend.read(case_id).await?.map(|stored| stored.value))
    }

    /// Create the wizard skeleton, or return the existing record untouched
    ///
    /// # Errors
    /// - `RecordError::Backend` on persistence failure or conflict
    pub async fn start_audit(&self, case_id: &CaseId, case_kind: CaseKind) -> RecordResult<AuditRecord> {
        let lock = self.lock_for(case_id);
        let guard = lock.lock().await;
        let result = self.create_if_absent(case_id, case_kind).await;
        drop(guard);
        self.release(case_id, lock);
        result
    }

    async fn create_if_absent(&self, case_id: &CaseId, case_kind: CaseKind) -> RecordResult<AuditRecord> {
        if let Some(existing) = self.backend.read(case_id).await? {
            debug!(case_id = %case_id, "audit already started");
            return Ok(existing.value);
        }

        let mut record = AuditRecord::skeleton(case_id.clone(), case_kind);
        record.summary = MANUAL_START_SUMMARY.to_string();
        record.updated_at = Some(Utc::now());
        self.backend.write(&record, None).await?;
        info!(case_id = %case_id, ?case_kind, "audit started");
        Ok(record)
    }

    /// Read-modify-write under the per-case lock
    async fn transact<F>(&self, case_id: &CaseId, mutate: F) -> RecordResult<AuditRecord>
    where
        F: FnOnce(&mut AuditRecord, DateTime<Utc>) -> RecordResult<()> + Send,
    {
        let lock = self.lock_for(case_id);
        let guard = lock.lock().await;
        let result = self.read_modify_write(case_id, mutate).await;
        drop(guard);
        self.release(case_id, lock);
        result
    }

    async fn read_modify_write<F>(&self, case_id: &CaseId, mutate: F) -> RecordResult<AuditRecord>
    where
        F: FnOnce(&mut AuditRecord, DateTime<Utc>) -> RecordResult<()> + Send,
    {
        let (mut record, expected) = match self.backend.read(case_id).await? {
            Some(stored) => (stored.value, Some(stored.version)),
            None => (AuditRecord::skeleton(case_id.clone(), CaseKind::default()), None),
        };

        let now = Utc::now();
        mutate(&mut record, now)?;
        record.updated_at = Some(now);

        let version = self.backend.write(&record, expected).await?;
        debug!(case_id = %case_id, %version, "record merged");
        Ok(record)
    }

    /// Field-level merge into one matrix entry
    ///
    /// # Errors
    /// - `RecordError::UnknownKey` if `key` is outside the section vocabulary
    /// - `RecordError::InvalidStatus` if the status does not fit the entry
    /// - `RecordError::Backend` on persistence failure or conflict
    pub async fn merge_section(
        &self,
        case_id: &CaseId,
        section: SectionName,
        key: &str,
        patch: ItemPatch,
    ) -> RecordResult<AuditRecord> {
        self.transact(case_id, |record, now| {
            record.merge_entry(section, key, &patch, now).map(|_| ())
        })
        .await
    }

    /// Replace the cockpit subtree only
    ///
    /// # Errors
    /// - `RecordError::Backend` on persistence failure or conflict
    pub async fn merge_cockpit(&self, case_id: &CaseId, parsed: ParsedAudit) -> RecordResult<AuditRecord> {
        self.transact(case_id, |record, _| {
            record.cockpit = Some(parsed);
            Ok(())
        })
        .await
    }

    /// Flip one validation flag
    ///
    /// # Errors
    /// - `RecordError::Backend` on persistence failure or conflict
    pub async fn mark_step_validated(&self, case_id: &CaseId, step: StepName) -> RecordResult<AuditRecord> {
        self.transact(case_id, |record, _| {
            record.steps_validated.mark(step);
            Ok(())
        })
        .await
    }

    /// Validate `step` and move the wizard forward, never backward
    ///
    /// # Errors
    /// - `RecordError::Backend` on persistence failure or conflict
    pub async fn advance_step(
        &self,
        case_id: &CaseId,
        step: StepName,
        next_step: u8,
    ) -> RecordResult<AuditRecord> {
        self.transact(case_id, |record, _| {
            record.steps_validated.mark(step);
            let target = next_step.min(record.max_step());
            record.wizard_step = target.max(record.wizard_step);
            Ok(())
        })
        .await
    }

    /// Apply a model verdict and its findings in one transaction
    ///
    /// Findings that do not fit the record are skipped with a warning.
    ///
    /// # Errors
    /// - `RecordError::Backend` on persistence failure or conflict
    pub async fn record_verdict(
        &self,
        case_id: &CaseId,
        status: ComplianceStatus,
        summary: &str,
        findings: &Findings,
    ) -> RecordResult<VerdictOutcome> {
        for skipped in &findings.skipped {
            warn!(case_id = %case_id, path = %skipped.path, reason = %skipped.reason, "finding skipped");
        }

        let mut applied = 0;
        let mut rejected = Vec::new();
        let record = self
            .transact(case_id, |record, now| {
                record.compliance_status = status;
                record.summary = summary.to_string();
                for finding in &findings.accepted {
                    match record.merge_entry(finding.section, &finding.key, &finding.patch, now) {
                        Ok(_) => applied += 1,
                        Err(e) => rejected.push(SkippedFinding {
                            path: format!("{}.{}", finding.section, finding.key),
                            reason: e.to_string(),
                        }),
                    }
                }
                Ok(())
            })
            .await?;

        for skipped in &rejected {
            warn!(case_id = %case_id, path = %skipped.path, reason = %skipped.reason, "finding rejected");
        }
        info!(case_id = %case_id, ?status, applied, "verdict recorded");

        let mut skipped = findings.skipped.clone();
        skipped.extend(rejected);
        Ok(VerdictOutcome {
            record,
            applied,
            skipped,
        })
    }
}
