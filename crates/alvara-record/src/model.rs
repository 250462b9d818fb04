//! Core types for the compliance record
//!
//! Defines:
//! - Case identity and case kind (which bounds the wizard)
//! - Compliance and item status vocabularies
//! - The six audit matrices and their fixed key vocabularies
//! - Field-level patches applied by the store

use crate::error::RecordError;
use crate::parser::ParsedAudit;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Case file identifier (foreign reference to the case)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseId(String);

impl CaseId {
    /// Wrap an identifier
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the raw identifier
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CaseId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Case variant, decides how many wizard steps exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaseKind {
    /// Occupancy permit review (3 steps)
    HabiteSe,
    /// Any other licensing case (4 steps)
    #[default]
    Licensing,
}

impl CaseKind {
    /// Derive the kind from a process-type label
    #[must_use]
    pub fn from_process_type(label: &str) -> Self {
        if label.to_uppercase().contains("HABITE") {
            Self::HabiteSe
        } else {
            Self::Licensing
        }
    }

    /// Last wizard step for this kind
    #[inline]
    #[must_use]
    pub fn max_step(self) -> u8 {
        match self {
            Self::HabiteSe => 3,
            Self::Licensing => 4,
        }
    }
}

/// Overall verdict of the audit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplianceStatus {
    /// All checks pass
    Compliant,
    /// At least one infraction
    NonCompliant,
    /// Needs a human decision
    ManualReview,
    /// Not decided yet
    #[default]
    Pending,
}

impl FromStr for ComplianceStatus {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let label = s.trim().to_uppercase().replace(['-', ' '], "_");
        match label.as_str() {
            "COMPLIANT" | "CONFORME" => Ok(Self::Compliant),
            "NON_COMPLIANT" | "INFRACAO" | "INFRAÇÃO" | "IRREGULAR" => Ok(Self::NonCompliant),
            "MANUAL_REVIEW" | "ANALISE_MANUAL" | "ANÁLISE_MANUAL" => Ok(Self::ManualReview),
            "PENDING" | "PENDENTE" => Ok(Self::Pending),
            _ => Err(RecordError::UnknownComplianceStatus(s.to_string())),
        }
    }
}

/// Status of one matrix entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    /// Checked and conforming
    Conforme,
    /// Checked and irregular
    Irregular,
    /// Sources disagree
    Divergente,
    /// Not applicable
    Na,
    /// Not checked yet
    #[default]
    Pendente,
}

impl ItemStatus {
    /// Whether an irregularity note may survive this status
    #[inline]
    #[must_use]
    pub fn keeps_note(self) -> bool {
        matches!(self, Self::Irregular | Self::Divergente)
    }

    /// Whether this status is accepted by the given entry kind
    #[inline]
    #[must_use]
    pub fn valid_for(self, kind: EntryKind) -> bool {
        match kind {
            EntryKind::Item => !matches!(self, Self::Divergente),
            EntryKind::Comparison => {
                matches!(self, Self::Conforme | Self::Divergente | Self::Pendente)
            }
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Conforme => "CONFORME",
            Self::Irregular => "IRREGULAR",
            Self::Divergente => "DIVERGENTE",
            Self::Na => "NA",
            Self::Pendente => "PENDENTE",
        };
        f.write_str(label)
    }
}

impl FromStr for ItemStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "CONFORME" | "OK" => Ok(Self::Conforme),
            "IRREGULAR" => Ok(Self::Irregular),
            "DIVERGENTE" => Ok(Self::Divergente),
            "NA" | "N/A" => Ok(Self::Na),
            "PENDENTE" => Ok(Self::Pendente),
            _ => Err(s.to_string()),
        }
    }
}

/// Scalar recorded in an audit item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Numeric measurement (areas, rates)
    Number(f64),
    /// Free text
    Text(String),
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

/// Single checklist entry
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AuditItem {
    /// Review status
    #[serde(default)]
    pub status: ItemStatus,
    /// Value confirmed by the analyst
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<FieldValue>,
    /// Value proposed by the model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_suggested_value: Option<FieldValue>,
    /// Document that backs the status
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_document: Option<String>,
    /// Why the entry is irregular
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub irregularity_note: Option<String>,
    /// Stamped by the store on every merge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

impl AuditItem {
    fn apply(&mut self, patch: &ItemPatch) {
        if let Some(value) = &patch.value {
            self.value = Some(value.clone());
        }
        if let Some(value) = &patch.ai_suggested_value {
            self.ai_suggested_value = Some(value.clone());
        }
        if let Some(doc) = &patch.evidence_document {
            self.evidence_document = Some(doc.clone());
        }
        if let Some(note) = &patch.irregularity_note {
            self.irregularity_note = Some(note.clone());
        }
        if let Some(status) = patch.status {
            self.status = status;
            if !status.keeps_note() {
                self.irregularity_note = None;
            }
        }
    }
}

/// Cross-document comparison of one field
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ComparisonItem {
    /// Value in the first source
    #[serde(default)]
    pub source_a: String,
    /// Value in the second source
    #[serde(default)]
    pub source_b: String,
    /// Value in the third source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_c: Option<String>,
    /// Value in the fourth source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_d: Option<String>,
    /// Comparison outcome
    #[serde(default)]
    pub status: ItemStatus,
    /// Analyst remark
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obs: Option<String>,
    /// Stamped by the store on every merge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

impl ComparisonItem {
    fn apply(&mut self, patch: &ItemPatch) {
        if let Some(a) = &patch.source_a {
            self.source_a = a.clone();
        }
        if let Some(b) = &patch.source_b {
            self.source_b = b.clone();
        }
        if let Some(c) = &patch.source_c {
            self.source_c = Some(c.clone());
        }
        if let Some(d) = &patch.source_d {
            self.source_d = Some(d.clone());
        }
        if let Some(obs) = &patch.obs {
            self.obs = Some(obs.clone());
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
    }
}

/// Shape of the entries a key holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// [`AuditItem`]
    Item,
    /// [`ComparisonItem`]
    Comparison,
}

/// One matrix slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatrixEntry {
    /// Checklist entry
    Item(AuditItem),
    /// Comparison entry
    Comparison(ComparisonItem),
}

impl MatrixEntry {
    /// Empty entry of the given kind
    #[must_use]
    pub fn empty(kind: EntryKind) -> Self {
        match kind {
            EntryKind::Item => Self::Item(AuditItem::default()),
            EntryKind::Comparison => Self::Comparison(ComparisonItem::default()),
        }
    }

    /// Kind of this entry
    #[inline]
    #[must_use]
    pub fn kind(&self) -> EntryKind {
        match self {
            Self::Item(_) => EntryKind::Item,
            Self::Comparison(_) => EntryKind::Comparison,
        }
    }

    /// Current status
    #[inline]
    #[must_use]
    pub fn status(&self) -> ItemStatus {
        match self {
            Self::Item(item) => item.status,
            Self::Comparison(item) => item.status,
        }
    }

    /// Shallow field-level merge, then stamp
    pub(crate) fn apply(&mut self, patch: &ItemPatch, now: DateTime<Utc>) {
        match self {
            Self::Item(item) => {
                item.apply(patch);
                item.last_modified = Some(now);
            }
            Self::Comparison(item) => {
                item.apply(patch);
                item.last_modified = Some(now);
            }
        }
    }
}

/// Mapping from key to entry
pub type Matrix = BTreeMap<String, MatrixEntry>;

/// Field-level update for one matrix entry
///
/// `None` leaves the stored field untouched. Fields that do not exist on the
/// addressed entry kind are ignored.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemPatch {
    /// New status
    pub status: Option<ItemStatus>,
    /// Analyst value (items)
    pub value: Option<FieldValue>,
    /// Model value (items)
    pub ai_suggested_value: Option<FieldValue>,
    /// Evidence document (items)
    pub evidence_document: Option<String>,
    /// Irregularity note (items)
    pub irregularity_note: Option<String>,
    /// First source (comparisons)
    pub source_a: Option<String>,
    /// Second source (comparisons)
    pub source_b: Option<String>,
    /// Third source (comparisons)
    pub source_c: Option<String>,
    /// Fourth source (comparisons)
    pub source_d: Option<String>,
    /// Remark (comparisons)
    pub obs: Option<String>,
}

impl ItemPatch {
    /// Empty patch
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With status
    #[inline]
    #[must_use]
    pub fn with_status(mut self, status: ItemStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// With analyst value
    #[inline]
    #[must_use]
    pub fn with_value(mut self, value: impl Into<FieldValue>) -> Self {
        self.value = Some(value.into());
        self
    }

    /// With evidence document
    #[inline]
    #[must_use]
    pub fn with_evidence(mut self, doc: impl Into<String>) -> Self {
        self.evidence_document = Some(doc.into());
        self
    }

    /// With irregularity note
    #[inline]
    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.irregularity_note = Some(note.into());
        self
    }

    /// With comparison sources
    #[inline]
    #[must_use]
    pub fn with_sources(mut self, a: impl Into<String>, b: impl Into<String>) -> Self {
        self.source_a = Some(a.into());
        self.source_b = Some(b.into());
        self
    }

    /// Whether the patch changes nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// The six independently addressable matrices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionName {
    /// Presence of mandatory documents
    DocumentsChecklist,
    /// Owner name across documents
    TitularityMatrix,
    /// Lot/street/neighbourhood across documents
    LocationMatrix,
    /// Areas across documents
    DimensionMatrix,
    /// Technical checklist
    ChecklistMatrix,
    /// Technical responsibility
    ResponsibilityMatrix,
}

const DOCUMENTS_KEYS: &[&str] = &[
    "protocolo",
    "bci",
    "cnd",
    "inteiro_teor",
    "art_projeto",
    "art_execucao",
    "licenca_anterior",
    "projeto_aprovado",
    "avcb",
    "carta_avenca",
    "licenca_construcao",
    "taxa_bci",
    "taxa_cnd",
    "documento_escritura",
    "documento_inteiro_teor",
    "checklist_fiscal",
    "projetos_aprovados",
    "empresa_contrato",
    "pessoa_fisica_doc",
    "nome_endereco_consistencia",
];

const TITULARITY_KEYS: &[&str] = &["protocol_vs_deed", "protocol_vs_project", "protocol_vs_art"];

const LOCATION_KEYS: &[&str] = &["lot_block_compare", "street_compare", "neighborhood_compare"];

const DIMENSION_KEYS: &[&str] = &["land_area_compare", "built_area_compare"];

const CHECKLIST_KEYS: &[&str] = &[
    "piso_tatil",
    "janelas_vizinhanca",
    "revestimento_impermeavel",
    "recuo_frontal",
    "recuos_laterais",
    "recuo_fundos",
    "taxa_ocupacao",
    "projeto_assinado",
    "medidas_conferem",
    "confrontantes_conferem",
    "area_uso_comum",
    "habitabilidade",
    "calcada_padrao",
    "numeracao_predial",
    "area_vistoria_vs_projeto",
];

const RESPONSIBILITY_KEYS: &[&str] = &[
    "certidao_data_check",
    "protocol_vs_deed",
    "protocol_vs_project",
    "protocol_vs_art",
    "lot_block_compare",
    "street_compare",
    "neighborhood_compare",
    "land_area_compare",
];

impl SectionName {
    /// Every section, in wizard order
    pub const ALL: [SectionName; 6] = [
        Self::DocumentsChecklist,
        Self::TitularityMatrix,
        Self::LocationMatrix,
        Self::DimensionMatrix,
        Self::ChecklistMatrix,
        Self::ResponsibilityMatrix,
    ];

    /// Storage name
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DocumentsChecklist => "documents_checklist",
            Self::TitularityMatrix => "titularity_matrix",
            Self::LocationMatrix => "location_matrix",
            Self::DimensionMatrix => "dimension_matrix",
            Self::ChecklistMatrix => "checklist_matrix",
            Self::ResponsibilityMatrix => "responsibility_matrix",
        }
    }

    /// Fixed key vocabulary
    #[must_use]
    pub fn keys(self) -> &'static [&'static str] {
        match self {
            Self::DocumentsChecklist => DOCUMENTS_KEYS,
            Self::TitularityMatrix => TITULARITY_KEYS,
            Self::LocationMatrix => LOCATION_KEYS,
            Self::DimensionMatrix => DIMENSION_KEYS,
            Self::ChecklistMatrix => CHECKLIST_KEYS,
            Self::ResponsibilityMatrix => RESPONSIBILITY_KEYS,
        }
    }

    /// Entry kind held by `key`, `None` when outside the vocabulary
    #[must_use]
    pub fn entry_kind(self, key: &str) -> Option<EntryKind> {
        if !self.keys().contains(&key) {
            return None;
        }
        let kind = match self {
            Self::DocumentsChecklist | Self::ChecklistMatrix => EntryKind::Item,
            Self::TitularityMatrix | Self::LocationMatrix | Self::DimensionMatrix => {
                EntryKind::Comparison
            }
            Self::ResponsibilityMatrix if key == "certidao_data_check" => EntryKind::Item,
            Self::ResponsibilityMatrix => EntryKind::Comparison,
        };
        Some(kind)
    }
}

impl fmt::Display for SectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SectionName {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|section| section.as_str() == s.trim())
            .ok_or_else(|| RecordError::UnknownSection(s.to_string()))
    }
}

/// Named validation flags of the wizard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    /// Step 1
    Preliminary,
    /// Step 2
    Documentation,
    /// Step 3
    CrossReference,
    /// Step 4 (licensing cases only)
    Responsibility,
    /// Cockpit report reviewed
    CockpitReviewed,
}

impl StepName {
    /// Flag validated when leaving wizard step `step`
    #[must_use]
    pub fn for_wizard_step(step: u8) -> Option<Self> {
        match step {
            1 => Some(Self::Preliminary),
            2 => Some(Self::Documentation),
            3 => Some(Self::CrossReference),
            4 => Some(Self::Responsibility),
            _ => None,
        }
    }
}

impl FromStr for StepName {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "preliminary" => Ok(Self::Preliminary),
            "documentation" => Ok(Self::Documentation),
            "cross_reference" => Ok(Self::CrossReference),
            "responsibility" => Ok(Self::Responsibility),
            "cockpit_reviewed" => Ok(Self::CockpitReviewed),
            other => Err(RecordError::UnknownStep(other.to_string())),
        }
    }
}

/// Validation flags; each only ever flips false to true
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StepsValidated {
    /// Preliminary check done
    pub preliminary: bool,
    /// Documentation check done
    pub documentation: bool,
    /// Cross reference done
    pub cross_reference: bool,
    /// Responsibility check done
    pub responsibility: bool,
    /// Cockpit reviewed
    pub cockpit_reviewed: bool,
}

impl StepsValidated {
    /// Set a flag
    pub fn mark(&mut self, step: StepName) {
        *self.flag_mut(step) = true;
    }

    /// Read a flag
    #[must_use]
    pub fn is_validated(&self, step: StepName) -> bool {
        match step {
            StepName::Preliminary => self.preliminary,
            StepName::Documentation => self.documentation,
            StepName::CrossReference => self.cross_reference,
            StepName::Responsibility => self.responsibility,
            StepName::CockpitReviewed => self.cockpit_reviewed,
        }
    }

    fn flag_mut(&mut self, step: StepName) -> &mut bool {
        match step {
            StepName::Preliminary => &mut self.preliminary,
            StepName::Documentation => &mut self.documentation,
            StepName::CrossReference => &mut self.cross_reference,
            StepName::Responsibility => &mut self.responsibility,
            StepName::CockpitReviewed => &mut self.cockpit_reviewed,
        }
    }
}

/// Compliance record of one case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Owning case
    pub case_id: CaseId,
    /// Case variant
    #[serde(default)]
    pub case_kind: CaseKind,
    /// Overall verdict
    #[serde(default)]
    pub compliance_status: ComplianceStatus,
    /// Verdict summary, last writer wins
    #[serde(default)]
    pub summary: String,
    /// Current wizard step (1-based)
    #[serde(default = "first_step")]
    pub wizard_step: u8,
    /// Validated wizard flags
    #[serde(default)]
    pub steps_validated: StepsValidated,
    /// Documents checklist
    #[serde(default)]
    pub documents_checklist: Matrix,
    /// Titularity comparisons
    #[serde(default)]
    pub titularity_matrix: Matrix,
    /// Location comparisons
    #[serde(default)]
    pub location_matrix: Matrix,
    /// Dimension comparisons
    #[serde(default)]
    pub dimension_matrix: Matrix,
    /// Technical checklist
    #[serde(default)]
    pub checklist_matrix: Matrix,
    /// Responsibility checks
    #[serde(default)]
    pub responsibility_matrix: Matrix,
    /// Parsed model report, read-only to the wizard
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cockpit: Option<ParsedAudit>,
    /// Last write time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

fn first_step() -> u8 {
    1
}

impl AuditRecord {
    /// Empty record at wizard step 1
    #[must_use]
    pub fn skeleton(case_id: CaseId, case_kind: CaseKind) -> Self {
        Self {
            case_id,
            case_kind,
            compliance_status: ComplianceStatus::Pending,
            summary: String::new(),
            wizard_step: first_step(),
            steps_validated: StepsValidated::default(),
            documents_checklist: Matrix::new(),
            titularity_matrix: Matrix::new(),
            location_matrix: Matrix::new(),
            dimension_matrix: Matrix::new(),
            checklist_matrix: Matrix::new(),
            responsibility_matrix: Matrix::new(),
            cockpit: None,
            updated_at: None,
        }
    }

    /// Borrow a matrix
    #[must_use]
    pub fn matrix(&self, section: SectionName) -> &Matrix {
        match section {
            SectionName::DocumentsChecklist => &self.documents_checklist,
            SectionName::TitularityMatrix => &self.titularity_matrix,
            SectionName::LocationMatrix => &self.location_matrix,
            SectionName::DimensionMatrix => &self.dimension_matrix,
            SectionName::ChecklistMatrix => &self.checklist_matrix,
            SectionName::ResponsibilityMatrix => &self.responsibility_matrix,
        }
    }

    /// Mutably borrow a matrix
    pub fn matrix_mut(&mut self, section: SectionName) -> &mut Matrix {
        match section {
            SectionName::DocumentsChecklist => &mut self.documents_checklist,
            SectionName::TitularityMatrix => &mut self.titularity_matrix,
            SectionName::LocationMatrix => &mut self.location_matrix,
            SectionName::DimensionMatrix => &mut self.dimension_matrix,
            SectionName::ChecklistMatrix => &mut self.checklist_matrix,
            SectionName::ResponsibilityMatrix => &mut self.responsibility_matrix,
        }
    }

    /// Look up one entry
    #[must_use]
    pub fn entry(&self, section: SectionName, key: &str) -> Option<&MatrixEntry> {
        self.matrix(section).get(key)
    }

    /// Last wizard step for this record's case kind
    #[inline]
    #[must_use]
    pub fn max_step(&self) -> u8 {
        self.case_kind.max_step()
    }

    /// Merge a patch into one entry, creating it if absent
    ///
    /// # Errors
    /// - `RecordError::UnknownKey` if `key` is outside the section vocabulary
    /// - `RecordError::InvalidStatus` if the status does not fit the entry kind
    pub fn merge_entry(
        &mut self,
        section: SectionName,
        key: &str,
        patch: &ItemPatch,
        now: DateTime<Utc>,
    ) -> Result<&MatrixEntry, RecordError> {
        let kind = section.entry_kind(key).ok_or_else(|| RecordError::UnknownKey {
            section,
            key: key.to_string(),
        })?;

        if let Some(status) = patch.status {
            if !status.valid_for(kind) {
                return Err(RecordError::InvalidStatus {
                    section,
                    key: key.to_string(),
                    status,
                });
            }
        }

        let entry = self
            .matrix_mut(section)
            .entry(key.to_string())
            .or_insert_with(|| MatrixEntry::empty(kind));
        if entry.kind() != kind {
            *entry = MatrixEntry::empty(kind);
        }
        entry.apply(patch, now);
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_kind_from_process_type() {
        assert_eq!(CaseKind::from_process_type("Revista de Habite-se"), CaseKind::HabiteSe);
        assert_eq!(CaseKind::from_process_type("HABITE_SE"), CaseKind::HabiteSe);
        assert_eq!(
            CaseKind::from_process_type("Licença para Construção"),
            CaseKind::Licensing
        );
        assert_eq!(CaseKind::HabiteSe.max_step(), 3);
        assert_eq!(CaseKind::Licensing.max_step(), 4);
    }

    #[test]
    fn compliance_status_accepts_legacy_labels() {
        assert_eq!("INFRACAO".parse::<ComplianceStatus>().unwrap(), ComplianceStatus::NonCompliant);
        assert_eq!("analise manual".parse::<ComplianceStatus>().unwrap(), ComplianceStatus::ManualReview);
        assert_eq!("compliant".parse::<ComplianceStatus>().unwrap(), ComplianceStatus::Compliant);
        assert!("maybe".parse::<ComplianceStatus>().is_err());
    }

    #[test]
    fn vocabulary_decides_entry_kind() {
        let section = SectionName::ResponsibilityMatrix;
        assert_eq!(section.entry_kind("certidao_data_check"), Some(EntryKind::Item));
        assert_eq!(section.entry_kind("street_compare"), Some(EntryKind::Comparison));
        assert_eq!(section.entry_kind("cnd"), None);
        assert_eq!(SectionName::DocumentsChecklist.entry_kind("cnd"), Some(EntryKind::Item));
    }

    #[test]
    fn status_change_clears_irregularity_note() {
        let mut record = AuditRecord::skeleton(CaseId::new("c1"), CaseKind::Licensing);
        let now = Utc::now();
        let section = SectionName::ChecklistMatrix;

        record
            .merge_entry(
                section,
                "recuo_frontal",
                &ItemPatch::new()
                    .with_status(ItemStatus::Irregular)
                    .with_note("recuo de 2m, mínimo 3m"),
                now,
            )
            .unwrap();
        let MatrixEntry::Item(item) = record.entry(section, "recuo_frontal").unwrap() else {
            panic!("expected item");
        };
        assert_eq!(item.irregularity_note.as_deref(), Some("recuo de 2m, mínimo 3m"));

        record
            .merge_entry(
                section,
                "recuo_frontal",
                &ItemPatch::new().with_status(ItemStatus::Conforme),
                now,
            )
            .unwrap();
        let MatrixEntry::Item(item) = record.entry(section, "recuo_frontal").unwrap() else {
            panic!("expected item");
        };
        assert_eq!(item.status, ItemStatus::Conforme);
        assert!(item.irregularity_note.is_none());
    }

    #[test]
    fn note_in_same_patch_as_clearing_status_is_dropped() {
        let mut record = AuditRecord::skeleton(CaseId::new("c1"), CaseKind::Licensing);
        record
            .merge_entry(
                SectionName::DocumentsChecklist,
                "cnd",
                &ItemPatch::new().with_status(ItemStatus::Na).with_note("stale"),
                Utc::now(),
            )
            .unwrap();
        let MatrixEntry::Item(item) = record.entry(SectionName::DocumentsChecklist, "cnd").unwrap()
        else {
            panic!("expected item");
        };
        assert!(item.irregularity_note.is_none());
    }

    #[test]
    fn comparison_rejects_item_only_status() {
        let mut record = AuditRecord::skeleton(CaseId::new("c1"), CaseKind::Licensing);
        let err = record
            .merge_entry(
                SectionName::LocationMatrix,
                "street_compare",
                &ItemPatch::new().with_status(ItemStatus::Irregular),
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, RecordError::InvalidStatus { .. }));
    }

    #[test]
    fn item_rejects_comparison_only_status() {
        let mut record = AuditRecord::skeleton(CaseId::new("c1"), CaseKind::Licensing);
        let err = record
            .merge_entry(
                SectionName::ChecklistMatrix,
                "taxa_ocupacao",
                &ItemPatch::new().with_status(ItemStatus::Divergente),
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, RecordError::InvalidStatus { .. }));
        assert!(record.entry(SectionName::ChecklistMatrix, "taxa_ocupacao").is_none());

        assert!(ItemStatus::Divergente.valid_for(EntryKind::Comparison));
        for status in [ItemStatus::Conforme, ItemStatus::Irregular, ItemStatus::Na, ItemStatus::Pendente] {
            assert!(status.valid_for(EntryKind::Item), "{status}");
        }
    }

    #[test]
    fn merge_keeps_untouched_fields() {
        let mut record = AuditRecord::skeleton(CaseId::new("c1"), CaseKind::Licensing);
        let section = SectionName::TitularityMatrix;
        record
            .merge_entry(
                section,
                "protocol_vs_deed",
                &ItemPatch::new().with_sources("Maria Souza", "Maria Souza"),
                Utc::now(),
            )
            .unwrap();
        record
            .merge_entry(
                section,
                "protocol_vs_deed",
                &ItemPatch::new().with_status(ItemStatus::Conforme),
                Utc::now(),
            )
            .unwrap();

        let MatrixEntry::Comparison(item) = record.entry(section, "protocol_vs_deed").unwrap()
        else {
            panic!("expected comparison");
        };
        assert_eq!(item.source_a, "Maria Souza");
        assert_eq!(item.status, ItemStatus::Conforme);
        assert!(item.last_modified.is_some());
    }

    #[test]
    fn record_json_roundtrip_keeps_entry_kinds() {
        let mut record = AuditRecord::skeleton(CaseId::new("c1"), CaseKind::HabiteSe);
        record
            .merge_entry(
                SectionName::ResponsibilityMatrix,
                "certidao_data_check",
                &ItemPatch::new().with_status(ItemStatus::Conforme),
                Utc::now(),
            )
            .unwrap();
        record
            .merge_entry(
                SectionName::ResponsibilityMatrix,
                "land_area_compare",
                &ItemPatch::new().with_sources("250", "250"),
                Utc::now(),
            )
            .unwrap();

        let json = serde_json::to_string(&record).unwrap();
        let back: AuditRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
        assert_eq!(
            back.entry(SectionName::ResponsibilityMatrix, "land_area_compare")
                .map(MatrixEntry::kind),
            Some(EntryKind::Comparison)
        );
    }

    #[test]
    fn steps_flags_are_named() {
        let mut steps = StepsValidated::default();
        steps.mark("cross_reference".parse().unwrap());
        assert!(steps.is_validated(StepName::CrossReference));
        assert!(!steps.is_validated(StepName::Preliminary));
        assert_eq!(StepName::for_wizard_step(4), Some(StepName::Responsibility));
        assert_eq!(StepName::for_wizard_step(5), None);
    }
}
