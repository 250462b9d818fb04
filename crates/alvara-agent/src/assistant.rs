//! Audit assistant: one call per user turn
//!
//! Builds the system instruction, gathers legislation for licensing turns,
//! assembles the new user turn and hands the exchange to the
//! [`StreamingAgent`].

use crate::agent::{ExchangeOutcome, Source, StreamingAgent, ToolInvocation, TurnEvent};
use crate::config::AssistantConfig;
use crate::model::{GenerativeModel, Part, Role, Turn, TurnRequest};
use crate::prompts::{system_instruction, AgentMode, Lens};
use crate::retry::RetryScheduler;
use crate::state_machine::AgentState;
use crate::tools::ToolTable;
use alvara_retrieval::{normalize_query, RetrievalClient, RetrievedExcerpt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Prior message of the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Speaker
    pub role: Role,
    /// Message text
    pub text: String,
}

impl ChatMessage {
    /// Message from the analyst
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    /// Message from the assistant
    #[must_use]
    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

/// Document attached to a turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// MIME type
    pub mime_type: String,
    /// Base64 payload
    pub data: String,
}

/// Input of one user turn
#[derive(Debug, Clone, PartialEq)]
pub struct TurnInput {
    /// Conversation so far
    pub history: Vec<ChatMessage>,
    /// New message
    pub text: String,
    /// Attached documents
    pub attachments: Vec<Attachment>,
    /// Conversation mode
    pub mode: AgentMode,
    /// Active technical lens
    pub lens: Option<Lens>,
}

impl TurnInput {
    /// Licensing turn without history or attachments
    #[must_use]
    pub fn licensing(text: impl Into<String>) -> Self {
        Self {
            history: Vec::new(),
            text: text.into(),
            attachments: Vec::new(),
            mode: AgentMode::Licensing,
            lens: None,
        }
    }

    /// With mode
    #[inline]
    #[must_use]
    pub fn with_mode(mut self, mode: AgentMode) -> Self {
        self.mode = mode;
        self
    }

    /// With lens
    #[inline]
    #[must_use]
    pub fn with_lens(mut self, lens: Lens) -> Self {
        self.lens = Some(lens);
        self
    }

    /// With history
    #[inline]
    #[must_use]
    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }

    /// With an attachment
    #[inline]
    #[must_use]
    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }
}

/// Summary of a processed turn
#[derive(Debug, Clone, PartialEq)]
pub struct TurnReport {
    /// Final agent state
    pub state: AgentState,
    /// Text forwarded to the caller
    pub forwarded: String,
    /// Executed tool call
    pub tool: Option<ToolInvocation>,
    /// Laws used as context
    pub sources: Vec<Source>,
    /// Normalized retrieval query, when retrieval ran
    pub retrieval_query: Option<String>,
}

/// Heading of the retrieved legislation block
pub const RAG_HEADER: &str = "\n\n--- INFORMAÇÃO LEGISLATIVA RECUPERADA (RAG) ---\n";

/// Closing of the retrieved legislation block
pub const RAG_FOOTER: &str =
    "\n--- FIM DA INFORMAÇÃO LEGISLATIVA ---\n\nUse essas informações acima para responder, se aplicável.\n";

/// Format retrieved excerpts as the context block prepended to the message
#[must_use]
pub fn legislation_block(excerpts: &[RetrievedExcerpt]) -> String {
    let body = excerpts
        .iter()
        .map(|e| {
            format!(
                ">>> LEI: {} ({})\nTRECHO RELEVANTE:\n{}\n<<<",
                e.title, e.category, e.excerpt
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("{RAG_HEADER}{body}{RAG_FOOTER}")
}

/// Licensing-audit assistant
pub struct AuditAssistant {
    agent: StreamingAgent,
    retrieval: Option<Arc<RetrievalClient>>,
    tools: ToolTable,
    temperature: f32,
    rag_min_chars: usize,
}

impl std::fmt::Debug for AuditAssistant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditAssistant")
            .field("agent", &self.agent)
            .field("tools", &self.tools)
            .field("retrieval", &self.retrieval.is_some())
            .finish_non_exhaustive()
    }
}

impl AuditAssistant {
    /// Create assistant over a model, configured by `config`
    #[must_use]
    pub fn new(model: Arc<dyn GenerativeModel>, config: &AssistantConfig) -> Self {
        let agent = StreamingAgent::new(model)
            .with_retry(RetryScheduler::new(config.retry))
            .with_timeout(config.turn_timeout());
        Self {
            agent,
            retrieval: None,
            tools: ToolTable::new(),
            temperature: config.temperature,
            rag_min_chars: config.rag_min_chars,
        }
    }

    /// With legislation retrieval
    #[must_use]
    pub fn with_retrieval(mut self, retrieval: Arc<RetrievalClient>) -> Self {
        self.retrieval = Some(retrieval);
        self
    }

    /// With tools offered on licensing turns
    #[must_use]
    pub fn with_tools(mut self, tools: ToolTable) -> Self {
        self.tools = tools;
        self
    }

    /// Process one user turn, streaming events to `events`
    pub async fn process_turn(
        &self,
        input: TurnInput,
        events: mpsc::Sender<TurnEvent>,
    ) -> TurnReport {
        let instruction = system_instruction(input.mode, input.lens);

        let mut retrieval_query = None;
        let mut sources = Vec::new();
        let mut context = String::new();
        if self.wants_retrieval(&input) {
            if let Some(client) = &self.retrieval {
                let query = normalize_query(&input.text);
                debug!(query = %query, "retrieving legislation");
                match client.retrieve(&query).await {
                    Ok(excerpts) if !excerpts.is_empty() => {
                        info!(query = %query, hits = excerpts.len(), "legislation found");
                        context = legislation_block(&excerpts);
                        sources = excerpts.iter().map(Source::from).collect();
                        if events.send(TurnEvent::Sources(sources.clone())).await.is_err() {
                            debug!("turn listener dropped");
                        }
                    }
                    Ok(_) => info!(query = %query, "no legislation found"),
                    Err(e) => warn!(query = %query, error = %e, "retrieval failed, continuing without context"),
                }
                retrieval_query = Some(query);
            }
        }

        let request = TurnRequest {
            system_instruction: instruction,
            prior_turns: prior_turns(&input.history),
            new_turn_parts: new_turn_parts(&input, &context),
            temperature: self.temperature,
            tools: if input.mode == AgentMode::Licensing {
                self.tools.declarations()
            } else {
                Vec::new()
            },
        };

        let tools = if input.mode == AgentMode::Licensing {
            self.tools.clone()
        } else {
            ToolTable::new()
        };
        let ExchangeOutcome {
            state,
            forwarded,
            tool,
            ..
        } = self.agent.run(request, &tools, &events).await;

        TurnReport {
            state,
            forwarded,
            tool,
            sources,
            retrieval_query,
        }
    }

    fn wants_retrieval(&self, input: &TurnInput) -> bool {
        input.mode == AgentMode::Licensing && input.text.chars().count() > self.rag_min_chars
    }
}

fn prior_turns(history: &[ChatMessage]) -> Vec<Turn> {
    history
        .iter()
        .filter(|m| !m.text.trim().is_empty())
        .map(|m| Turn::text(m.role, m.text.clone()))
        .collect()
}

fn new_turn_parts(input: &TurnInput, context: &str) -> Vec<Part> {
    let mut parts: Vec<Part> = input
        .attachments
        .iter()
        .map(|a| Part::InlineData {
            mime_type: a.mime_type.clone(),
            data: a.data.clone(),
        })
        .collect();
    parts.push(Part::Text(format!("{context}{}", input.text)));
    parts
}
