//! Alvará Agent - streaming licensing-audit assistant
//!
//! Drives one model exchange per user turn:
//! - Lens-specific system instruction and legislation retrieval
//! - Streamed text with tool-call capture and a single tool round-trip
//! - Backoff on quota errors and a wall-clock turn deadline
//! - The `save_audit_parameters` tool writing into the record store
//!
//! # Example
//!
//! ```rust,ignore
//! use alvara_agent::prelude::*;
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//!
//! # async fn example(config: AssistantConfig) -> Result<(), ModelError> {
//! let model = Arc::new(GeminiClient::from_config(&config)?);
//! let assistant = AuditAssistant::new(model, &config);
//!
//! let (events, mut rx) = mpsc::channel(64);
//! let turn = TurnInput::licensing("qual artigo fala do prisma de ventilação")
//!     .with_lens(Lens::Comercial);
//! let report = tokio::spawn(async move { assistant.process_turn(turn, events).await });
//!
//! while let Some(TurnEvent::Chunk(text)) = rx.recv().await {
//!     print!("{text}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod assistant;
pub mod config;
pub mod error;
pub mod gemini;
pub mod model;
pub mod prompts;
pub mod retry;
pub mod state_machine;
pub mod tools;

pub use agent::{
    ExchangeOutcome, Source, StreamingAgent, ToolInvocation, TurnEvent, DEFAULT_TURN_TIMEOUT,
    FAILURE_PREFIX, TIMEOUT_CHUNK,
};
pub use assistant::{
    legislation_block, Attachment, AuditAssistant, ChatMessage, TurnInput, TurnReport,
};
pub use config::{AssistantConfig, CorpusSettings, GeminiSettings, RetryPolicy};
pub use error::{AgentError, ConfigError, ModelError, ToolError};
pub use gemini::{sse_deltas, GeminiClient, SseDecoder};
pub use model::{
    GenerativeModel, ModelStream, Part, Role, StreamDelta, ToolCall, Turn, TurnRequest,
};
pub use prompts::{system_instruction, AgentMode, Lens};
pub use retry::{Recoverable, RetryScheduler};
pub use state_machine::{allowed_transitions, validate_transition, AgentState, StateTracker};
pub use tools::{
    SaveAuditArgs, SaveAuditTool, ToolDeclaration, ToolHandler, ToolTable, SAVED_REPLY,
    SAVE_AUDIT_TOOL,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for running audit turns
    pub use crate::{
        AgentMode, AssistantConfig, AuditAssistant, GeminiClient, GenerativeModel, Lens,
        ModelError, SaveAuditTool, ToolTable, TurnEvent, TurnInput, TurnReport,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
