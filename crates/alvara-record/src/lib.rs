//! Alvará Record - compliance record of a licensing audit
//!
//! Owns everything that is persisted about a case:
//! - The versioned `AuditRecord` with its six matrices and wizard state
//! - Merge-safe mutations through `AuditStateStore`
//! - The lenient markdown parser feeding the cockpit view
//! - Lookup of cases by protocol number
//!
//! # Example
//!
//! ```rust,ignore
//! use alvara_record::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), RecordError> {
//! let store = AuditStateStore::new(Arc::new(MemoryBackend::new()));
//! let case = CaseId::new("a1b2");
//!
//! store.start_audit(&case, CaseKind::Licensing).await?;
//! store
//!     .merge_section(
//!         &case,
//!         SectionName::DocumentsChecklist,
//!         "cnd",
//!         ItemPatch::new().with_status(ItemStatus::Conforme),
//!     )
//!     .await?;
//! store.advance_step(&case, StepName::Preliminary, 2).await?;
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod directory;
pub mod error;
pub mod findings;
pub mod model;
pub mod parser;
pub mod store;

pub use backend::{JsonFileBackend, MemoryBackend, RecordBackend, Version, Versioned};
pub use directory::{protocol_digits, CaseDirectory, CaseRef, MemoryDirectory};
pub use error::{BackendError, RecordError, RecordResult};
pub use findings::{extract_findings, Finding, Findings, SkippedFinding};
pub use model::{
    AuditItem, AuditRecord, CaseId, CaseKind, ComparisonItem, ComplianceStatus, EntryKind,
    FieldValue, ItemPatch, ItemStatus, Matrix, MatrixEntry, SectionName, StepName, StepsValidated,
};
pub use parser::{
    parse_audit_markdown, AuditSection, CaseHeader, CockpitItem, CockpitStatus, ParsedAudit,
    StatusTally,
};
pub use store::{AuditStateStore, VerdictOutcome, MANUAL_START_SUMMARY};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with compliance records
    pub use crate::{
        AuditRecord, AuditStateStore, CaseDirectory, CaseId, CaseKind, ComplianceStatus,
        ItemPatch, ItemStatus, MemoryBackend, ParsedAudit, RecordBackend, RecordError,
        SectionName, StepName,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
