//! Extraction of matrix patches from a model-supplied `audit_json`
//!
//! Expected shape is `{ section: { key: { field: value } } }`. Anything that
//! does not fit is reported as skipped, never as an error.

use crate::model::{FieldValue, ItemPatch, ItemStatus, SectionName};
use serde_json::{Map, Value};

/// Patch addressed to one matrix entry
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    /// Target section
    pub section: SectionName,
    /// Target key
    pub key: String,
    /// Fields to merge
    pub patch: ItemPatch,
}

/// Part of the payload that was ignored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFinding {
    /// Dotted location inside the payload
    pub path: String,
    /// Why it was ignored
    pub reason: String,
}

/// Result of reading an `audit_json` payload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Findings {
    /// Usable patches
    pub accepted: Vec<Finding>,
    /// Ignored parts
    pub skipped: Vec<SkippedFinding>,
}

impl Findings {
    fn skip(&mut self, path: impl Into<String>, reason: impl Into<String>) {
        self.skipped.push(SkippedFinding {
            path: path.into(),
            reason: reason.into(),
        });
    }
}

/// Read every recognisable `section -> key -> fields` entry
#[must_use]
pub fn extract_findings(audit_json: &Value) -> Findings {
    let mut findings = Findings::default();

    // Models sometimes send the object JSON-encoded as a string.
    let decoded;
    let root = match audit_json {
        Value::String(text) => match serde_json::from_str::<Value>(text) {
            Ok(value) => {
                decoded = value;
                &decoded
            }
            Err(_) => {
                findings.skip("audit_json", "string is not a JSON object");
                return findings;
            }
        },
        other => other,
    };

    let Some(sections) = root.as_object() else {
        if !root.is_null() {
            findings.skip("audit_json", "expected an object");
        }
        return findings;
    };

    for (section_name, entries) in sections {
        let Ok(section) = section_name.parse::<SectionName>() else {
            findings.skip(section_name.as_str(), "unknown section");
            continue;
        };
        let Some(entries) = entries.as_object() else {
            findings.skip(section_name.as_str(), "expected an object of keys");
            continue;
        };

        for (key, fields) in entries {
            let path = format!("{section_name}.{key}");
            if section.entry_kind(key).is_none() {
                findings.skip(path, "unknown key");
                continue;
            }
            let patch = match fields {
                Value::String(status) => status_only(status, &path, &mut findings),
                Value::Object(fields) => read_fields(fields, &path, &mut findings),
                _ => {
                    findings.skip(path, "expected an object of fields");
                    continue;
                }
            };
            if patch.is_empty() {
                findings.skip(path, "no usable fields");
                continue;
            }
            findings.accepted.push(Finding {
                section,
                key: key.clone(),
                patch,
            });
        }
    }

    findings
}

fn status_only(status: &str, path: &str, findings: &mut Findings) -> ItemPatch {
    match status.parse::<ItemStatus>() {
        Ok(status) => ItemPatch::new().with_status(status),
        Err(raw) => {
            findings.skip(format!("{path}.status"), format!("unrecognised status '{raw}'"));
            ItemPatch::new()
        }
    }
}

fn read_fields(fields: &Map<String, Value>, path: &str, findings: &mut Findings) -> ItemPatch {
    let mut patch = ItemPatch::new();

    for (name, value) in fields {
        let field_path = format!("{path}.{name}");
        match name.as_str() {
            "status" => match value.as_str().map(str::parse::<ItemStatus>) {
                Some(Ok(status)) => patch.status = Some(status),
                _ => findings.skip(field_path, "unrecognised status"),
            },
            "value" => patch.value = field_value(value),
            "ai_suggested_value" | "aiSuggestedValue" => patch.ai_suggested_value = field_value(value),
            "evidence_document" | "evidenceDocument" => patch.evidence_document = text(value),
            "irregularity_note" | "irregularityNote" => patch.irregularity_note = text(value),
            "source_a" | "sourceA" => patch.source_a = text(value),
            "source_b" | "sourceB" => patch.source_b = text(value),
            "source_c" | "sourceC" => patch.source_c = text(value),
            "source_d" | "sourceD" => patch.source_d = text(value),
            "obs" => patch.obs = text(value),
            _ => findings.skip(field_path, "unknown field"),
        }
    }

    patch
}

fn field_value(value: &Value) -> Option<FieldValue> {
    match value {
        Value::Number(n) => n.as_f64().map(FieldValue::Number),
        Value::String(s) => Some(FieldValue::Text(s.clone())),
        _ => None,
    }
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
