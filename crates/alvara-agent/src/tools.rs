//! Tools the model may call, and the audit persistence tool

use crate::error::ToolError;
use crate::model::ToolCall;
use alvara_record::{
    extract_findings, AuditStateStore, CaseDirectory, ComplianceStatus, VerdictOutcome,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Name of the audit persistence tool
pub const SAVE_AUDIT_TOOL: &str = "save_audit_parameters";

/// Reply after a verdict was stored
pub const SAVED_REPLY: &str = "✅ AUDITORIA SALVA!";

/// Function declaration advertised to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    /// Function name
    pub name: String,
    /// What the function does
    pub description: String,
    /// JSON schema of the arguments
    pub parameters: Value,
}

/// Async tool implementation
#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync {
    /// Declaration sent to the model
    fn declaration(&self) -> ToolDeclaration;

    /// Run the tool, returning the text handed back to the model
    async fn call(&self, args: &Value) -> Result<String, ToolError>;
}

/// Tools available to a turn, by name
#[derive(Clone, Default)]
pub struct ToolTable {
    handlers: BTreeMap<String, Arc<dyn ToolHandler>>,
}

impl std::fmt::Debug for ToolTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolTable")
            .field("tools", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ToolTable {
    /// Empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under its declared name
    #[must_use]
    pub fn with_handler(mut self, handler: Arc<dyn ToolHandler>) -> Self {
        self.handlers.insert(handler.declaration().name, handler);
        self
    }

    /// Check if the table is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Declarations of all registered tools
    #[must_use]
    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        self.handlers.values().map(|h| h.declaration()).collect()
    }

    /// Run a call, turning every failure into text for the model
    pub async fn invoke(&self, call: &ToolCall) -> String {
        let Some(handler) = self.handlers.get(&call.name) else {
            warn!(tool = %call.name, "model called an unknown tool");
            return format!("Error: unknown tool '{}'", call.name);
        };
        match handler.call(&call.args).await {
            Ok(result) => result,
            Err(e) => {
                warn!(tool = %call.name, error = %e, "tool failed");
                format!("Error: {e}")
            }
        }
    }
}

/// Arguments of `save_audit_parameters`
#[derive(Debug, Clone, PartialEq)]
pub struct SaveAuditArgs {
    /// Protocol number as written by the model
    pub protocol_number: String,
    /// Verdict
    pub compliance_status: ComplianceStatus,
    /// Verdict summary
    pub summary: String,
    /// Per-item findings
    pub audit_json: Value,
}

impl SaveAuditArgs {
    /// Read arguments from the model's call
    ///
    /// # Errors
    /// - `ToolError::InvalidArguments` if a required field is missing or the
    ///   status label is unknown
    pub fn from_value(args: &Value) -> Result<Self, ToolError> {
        let protocol_number = scalar_text(args, "protocol_number")
            .ok_or_else(|| ToolError::InvalidArguments("protocol_number is required".into()))?;
        let status_label = scalar_text(args, "compliance_status")
            .ok_or_else(|| ToolError::InvalidArguments("compliance_status is required".into()))?;
        let compliance_status = status_label
            .parse()
            .map_err(|e: alvara_record::RecordError| ToolError::InvalidArguments(e.to_string()))?;

        Ok(Self {
            protocol_number,
            compliance_status,
            summary: scalar_text(args, "summary").unwrap_or_default(),
            audit_json: args.get("audit_json").cloned().unwrap_or(Value::Null),
        })
    }
}

fn scalar_text(args: &Value, field: &str) -> Option<String> {
    match args.get(field)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Persists the model's verdict and findings for a case
pub struct SaveAuditTool {
    directory: Arc<dyn CaseDirectory>,
    store: Arc<AuditStateStore>,
}

impl std::fmt::Debug for SaveAuditTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaveAuditTool").finish_non_exhaustive()
    }
}

impl SaveAuditTool {
    /// Create tool over a case directory and record store
    #[must_use]
    pub fn new(directory: Arc<dyn CaseDirectory>, store: Arc<AuditStateStore>) -> Self {
        Self { directory, store }
    }

    /// Resolve the case and record the verdict
    ///
    /// Returns `None` when no case matches the protocol number.
    ///
    /// # Errors
    /// - `ToolError::Directory` if the lookup fails
    /// - `ToolError::Record` if the store rejects the write
    pub async fn save(&self, args: &SaveAuditArgs) -> Result<Option<VerdictOutcome>, ToolError> {
        let Some(case) = self.directory.resolve(&args.protocol_number).await? else {
            return Ok(None);
        };

        self.store.start_audit(&case.case_id, case.case_kind).await?;
        let findings = extract_findings(&args.audit_json);
        let outcome = self
            .store
            .record_verdict(&case.case_id, args.compliance_status, &args.summary, &findings)
            .await?;

        info!(
            case_id = %case.case_id,
            protocol = %case.protocol,
            applied = outcome.applied,
            skipped = outcome.skipped.len(),
            "audit saved"
        );
        Ok(Some(outcome))
    }
}

#[async_trait::async_trait]
impl ToolHandler for SaveAuditTool {
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration {
            name: SAVE_AUDIT_TOOL.to_string(),
            description: "Salva os parâmetros técnicos da auditoria no banco de dados.".to_string(),
            parameters: json!({
                "type": "OBJECT",
                "properties": {
                    "protocol_number": {"type": "STRING"},
                    "compliance_status": {"type": "STRING"},
                    "summary": {"type": "STRING"},
                    "audit_json": {"type": "OBJECT"}
                },
                "required": ["protocol_number", "compliance_status"]
            }),
        }
    }

    async fn call(&self, args: &Value) -> Result<String, ToolError> {
        let args = SaveAuditArgs::from_value(args)?;
        match self.save(&args).await? {
            Some(_) => Ok(SAVED_REPLY.to_string()),
            None => {
                warn!(protocol = %args.protocol_number, "no case for protocol");
                Ok(format!("Processo {} não encontrado.", args.protocol_number))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alvara_record::{CaseId, CaseKind, CaseRef, ItemStatus, MemoryBackend, MemoryDirectory, SectionName};

    fn tool() -> (SaveAuditTool, Arc<AuditStateStore>) {
        let directory = MemoryDirectory::with_cases([CaseRef {
            case_id: CaseId::new("case-7"),
            protocol: "2024/0153".to_string(),
            case_kind: CaseKind::HabiteSe,
        }]);
        let store = Arc::new(AuditStateStore::new(Arc::new(MemoryBackend::new())));
        (SaveAuditTool::new(Arc::new(directory), Arc::clone(&store)), store)
    }

    #[test]
    fn args_accept_numeric_protocol() {
        let args = SaveAuditArgs::from_value(&json!({
            "protocol_number": 20_240_153,
            "compliance_status": "conforme"
        }))
        .unwrap();
        assert_eq!(args.protocol_number, "20240153");
        assert_eq!(args.compliance_status, ComplianceStatus::Compliant);
        assert_eq!(args.audit_json, Value::Null);
    }

    #[test]
    fn args_reject_missing_status() {
        let err = SaveAuditArgs::from_value(&json!({"protocol_number": "1"})).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn saves_verdict_by_protocol_digits() {
        let (tool, store) = tool();
        let reply = tool
            .call(&json!({
                "protocol_number": "20240153",
                "compliance_status": "NON_COMPLIANT",
                "summary": "CND vencida",
                "audit_json": {"documents_checklist": {"cnd": {"status": "IRREGULAR", "irregularity_note": "vencida"}}}
            }))
            .await
            .unwrap();
        assert_eq!(reply, SAVED_REPLY);

        let record = store.get(&CaseId::new("case-7")).await.unwrap().unwrap();
        assert_eq!(record.case_kind, CaseKind::HabiteSe);
        assert_eq!(record.compliance_status, ComplianceStatus::NonCompliant);
        assert_eq!(record.summary, "CND vencida");
        let entry = record.entry(SectionName::DocumentsChecklist, "cnd").unwrap();
        assert_eq!(entry.status(), ItemStatus::Irregular);
    }

    #[tokio::test]
    async fn unknown_protocol_is_reported_to_model() {
        let (tool, _) = tool();
        let reply = tool
            .call(&json!({"protocol_number": "999", "compliance_status": "COMPLIANT"}))
            .await
            .unwrap();
        assert_eq!(reply, "Processo 999 não encontrado.");
    }

    #[tokio::test]
    async fn table_reports_unknown_tools_and_failures() {
        let (tool, _) = tool();
        let table = ToolTable::new().with_handler(Arc::new(tool));
        assert_eq!(table.declarations()[0].name, SAVE_AUDIT_TOOL);

        let unknown = ToolCall {
            name: "delete_everything".to_string(),
            args: json!({}),
            id: "c1".to_string(),
        };
        assert_eq!(table.invoke(&unknown).await, "Error: unknown tool 'delete_everything'");

        let bad = ToolCall {
            name: SAVE_AUDIT_TOOL.to_string(),
            args: json!({"protocol_number": "1", "compliance_status": "MAYBE"}),
            id: "c2".to_string(),
        };
        assert!(table.invoke(&bad).await.starts_with("Error: invalid arguments"));
    }
}
