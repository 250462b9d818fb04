//! Lenient parser for model-authored audit reports
//!
//! The report is free text that only loosely follows the requested layout, so
//! the parser works line by line, keeps whatever it recognises and silently
//! drops the rest. It never fails.
//!
//! # Example
//!
//! ```
//! use alvara_record::parser::{parse_audit_markdown, CockpitStatus};
//!
//! let report = "Protocolo: 2024/0153\n2. CHECKLIST DOCUMENTAL\n• CND apresentado\n• ART ausente";
//! let parsed = parse_audit_markdown(report);
//!
//! assert_eq!(parsed.case_header.protocol, "2024/0153");
//! assert_eq!(parsed.sections[0].items[0].status, CockpitStatus::Ok);
//! assert_eq!(parsed.sections[0].items[1].status, CockpitStatus::Error);
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static SECTION_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+\.?\d*)\.?\s+(.*)$").expect("static regex"));

static HEADER_FIELD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(protocolo|interessado|assunto)\s*:").expect("static regex")
});

static BULLET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:•|-|o\t|\*\s)\s*").expect("static regex"));

static PARECER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)parecer:\s*(.*)$").expect("static regex"));

const SECTION_MARKERS: [&str; 3] = ["CHECKLIST", "QUADRO", "FASE"];

/// Item classification shown in the cockpit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CockpitStatus {
    /// Approved or present
    Ok,
    /// Absent, pending or wrong
    Error,
    /// Needs attention
    Warning,
    /// No cue found
    #[default]
    Pending,
}

impl CockpitStatus {
    /// Classify an item by its textual cues, strongest first
    #[must_use]
    pub fn classify(text: &str) -> Self {
        let lower = text.to_lowercase();
        let has = |cues: &[&str]| cues.iter().any(|cue| lower.contains(cue));

        if text.contains('✅') || has(&["apresentado", "parecer: ok"]) {
            Self::Ok
        } else if text.contains('❌') || has(&["não consta", "ausente", "pendente", "erro"]) {
            Self::Error
        } else if text.contains('⚠') || has(&["atenção", "divergência"]) {
            Self::Warning
        } else {
            Self::Pending
        }
    }
}

/// Identification block of the report
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CaseHeader {
    /// Protocol number as written
    pub protocol: String,
    /// Applicant
    pub interested_party: String,
    /// Subject of the request
    pub subject: String,
}

/// One checklist line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CockpitItem {
    /// `row-<line index>`
    pub id: String,
    /// Line text without the bullet glyph
    pub text: String,
    /// Derived status
    pub status: CockpitStatus,
    /// Text following a `Parecer:` cue
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
}

/// Numbered checklist section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditSection {
    /// Heading text without the number
    pub title: String,
    /// Items in report order
    pub items: Vec<CockpitItem>,
}

/// Structured view of a report
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ParsedAudit {
    /// Identification block
    pub case_header: CaseHeader,
    /// Sections in report order
    pub sections: Vec<AuditSection>,
}

/// Per-status item counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusTally {
    /// Items classified ok
    pub ok: usize,
    /// Items classified error
    pub error: usize,
    /// Items classified warning
    pub warning: usize,
    /// Items with no cue
    pub pending: usize,
}

impl ParsedAudit {
    /// Count items by status across all sections
    #[must_use]
    pub fn tally(&self) -> StatusTally {
        let mut tally = StatusTally::default();
        for item in self.sections.iter().flat_map(|s| &s.items) {
            match item.status {
                CockpitStatus::Ok => tally.ok += 1,
                CockpitStatus::Error => tally.error += 1,
                CockpitStatus::Warning => tally.warning += 1,
                CockpitStatus::Pending => tally.pending += 1,
            }
        }
        tally
    }

    /// Total number of items
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.sections.iter().map(|s| s.items.len()).sum()
    }
}

/// Parse a report into header and sections
#[must_use]
pub fn parse_audit_markdown(markdown: &str) -> ParsedAudit {
    let mut result = ParsedAudit::default();
    let mut current: Option<AuditSection> = None;

    for (index, line) in markdown.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        read_header_field(trimmed, &mut result.case_header);

        if let Some(title) = section_title(trimmed) {
            if let Some(done) = current.take() {
                result.sections.push(done);
            }
            current = Some(AuditSection {
                title,
                items: Vec::new(),
            });
            continue;
        }

        if let Some(section) = current.as_mut() {
            if let Some(item) = bullet_item(trimmed, index) {
                section.items.push(item);
            }
        }
    }

    if let Some(done) = current {
        result.sections.push(done);
    }
    result
}

fn read_header_field(line: &str, header: &mut CaseHeader) {
    let Some(caps) = HEADER_FIELD.captures(line) else {
        return;
    };
    let value = line
        .split_once(':')
        .map(|(_, rest)| rest.trim().trim_matches('*').trim().to_string())
        .unwrap_or_default();

    match caps[1].to_lowercase().as_str() {
        "protocolo" => header.protocol = value,
        "interessado" => header.interested_party = value,
        _ => header.subject = value,
    }
}

fn section_title(line: &str) -> Option<String> {
    let bare = line.trim_start_matches(['#', '*', ' ']);
    let caps = SECTION_HEADING.captures(bare)?;
    let upper = bare.to_uppercase();
    if !SECTION_MARKERS.iter().any(|marker| upper.contains(marker)) {
        return None;
    }
    Some(caps[2].replace('*', "").trim().to_string())
}

fn bullet_item(line: &str, index: usize) -> Option<CockpitItem> {
    let glyph = BULLET.find(line)?;
    let text = line[glyph.end()..].trim();
    if text.is_empty() || text.chars().all(|c| c == '-') {
        return None;
    }

    let comment = PARECER
        .captures(text)
        .map(|caps| caps[1].trim().to_string())
        .filter(|c| !c.is_empty());

    Some(CockpitItem {
        id: format!("row-{index}"),
        text: text.to_string(),
        status: CockpitStatus::classify(text),
        comment,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    const REPORT: &str = "\
# PARECER TÉCNICO
• Protocolo: 2024/0153
• Interessado: Maria Souza
• Assunto: Licença para Construção

1. MÓDULO DE CONFORMIDADE
- isto fica fora de qualquer seção

2. CHECKLIST DOCUMENTAL
• CND apresentado
• ART ausente
- Matrícula: ⚠️ divergência de área
o\tAlvará anterior sem informação

4.1. FASE DE PROJETO
* Recuo frontal ✅ parecer: ok
- ---
";

    #[test]
    fn extracts_header_fields() {
        let parsed = parse_audit_markdown(REPORT);
        assert_eq!(
            parsed.case_header,
            CaseHeader {
                protocol: "2024/0153".to_string(),
                interested_party: "Maria Souza".to_string(),
                subject: "Licença para Construção".to_string(),
            }
        );
    }

    #[test]
    fn sections_need_marker_words() {
        let parsed = parse_audit_markdown(REPORT);
        let titles: Vec<_> = parsed.sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["CHECKLIST DOCUMENTAL", "FASE DE PROJETO"]);
    }

    #[test]
    fn classifies_bullets() {
        let parsed = parse_audit_markdown(REPORT);
        let items = &parsed.sections[0].items;
        assert_eq!(items.len(), 4);
        assert_eq!(items[0].text, "CND apresentado");
        assert_eq!(items[0].status, CockpitStatus::Ok);
        assert_eq!(items[1].status, CockpitStatus::Error);
        assert_eq!(items[2].status, CockpitStatus::Warning);
        assert_eq!(items[3].text, "Alvará anterior sem informação");
        assert_eq!(items[3].status, CockpitStatus::Pending);
        assert_eq!(items[0].id, "row-9");
    }

    #[test]
    fn parecer_becomes_comment() {
        let parsed = parse_audit_markdown(REPORT);
        let phase = &parsed.sections[1];
        assert_eq!(phase.items.len(), 1);
        assert_eq!(phase.items[0].status, CockpitStatus::Ok);
        assert_eq!(phase.items[0].comment.as_deref(), Some("ok"));
    }

    #[test]
    fn bullets_outside_sections_are_dropped() {
        let parsed = parse_audit_markdown("• CND apresentado\nlinha solta\n");
        assert!(parsed.sections.is_empty());
    }

    #[test]
    fn emphasised_headings_are_recognised() {
        let parsed = parse_audit_markdown("### **3. QUADRO DE ÁREAS**\n- Área do terreno conferida ✅");
        assert_eq!(parsed.sections[0].title, "QUADRO DE ÁREAS");
        assert_eq!(parsed.tally().ok, 1);
    }

    #[test]
    fn status_priority_prefers_ok() {
        assert_eq!(
            CockpitStatus::classify("✅ apresentado, sem pendente"),
            CockpitStatus::Ok
        );
        assert_eq!(CockpitStatus::classify("Não consta ⚠️"), CockpitStatus::Error);
    }

    proptest! {
        #[test]
        fn parsing_is_deterministic(input in "(?s).{0,400}") {
            prop_assert_eq!(parse_audit_markdown(&input), parse_audit_markdown(&input));
        }

        #[test]
        fn item_ids_point_at_bullet_lines(
            lines in proptest::collection::vec("(• |- )?[a-zA-Zçãé ]{1,20}", 0..20)
        ) {
            let mut input = String::from("1. CHECKLIST\n");
            input.push_str(&lines.join("\n"));
            let parsed = parse_audit_markdown(&input);
            let source: Vec<&str> = input.lines().collect();
            for item in parsed.sections.iter().flat_map(|s| &s.items) {
                let index: usize = item.id.trim_start_matches("row-").parse().unwrap();
                prop_assert!(source[index].trim().ends_with(item.text.as_str()));
            }
        }
    }
}
