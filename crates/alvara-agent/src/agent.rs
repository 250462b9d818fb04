//! Streaming agent
//!
//! Runs one exchange with the model: forwards text while no tool call has
//! been seen, executes the first tool call, answers it, and forwards the
//! follow-up stream. The whole exchange races the turn deadline.

use crate::error::{AgentError, ModelError};
use crate::model::{GenerativeModel, ModelStream, ToolCall, TurnRequest};
use crate::retry::RetryScheduler;
use crate::state_machine::{AgentState, StateTracker};
use crate::tools::ToolTable;
use alvara_retrieval::{LawCategory, RetrievedExcerpt};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Chunk emitted when the turn deadline passes
pub const TIMEOUT_CHUNK: &str = "**ERRO:** ⚠️ Volume de documentos muito grande.";

/// Prefix of the chunk emitted on a communication failure
pub const FAILURE_PREFIX: &str = "**ERRO:** Falha na comunicação: ";

/// Default turn deadline
pub const DEFAULT_TURN_TIMEOUT: Duration = Duration::from_secs(600);

/// Law reported as grounding for a turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    /// Law name
    pub title: String,
    /// Law kind
    pub category: LawCategory,
}

impl From<&RetrievedExcerpt> for Source {
    fn from(excerpt: &RetrievedExcerpt) -> Self {
        Self {
            title: excerpt.title.clone(),
            category: excerpt.category,
        }
    }
}

/// Event delivered to the caller during a turn
#[derive(Debug, Clone, PartialEq)]
pub enum TurnEvent {
    /// Text to display, in stream order
    Chunk(String),
    /// Laws retrieved for the turn
    Sources(Vec<Source>),
}

/// Tool call executed during a turn
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    /// Call as received
    pub call: ToolCall,
    /// Text returned to the model
    pub result: String,
}

/// Result of one exchange
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeOutcome {
    /// Final state, `Done` or `Error`
    pub state: AgentState,
    /// States visited
    pub path: Vec<AgentState>,
    /// Text forwarded to the caller, error chunks included
    pub forwarded: String,
    /// Executed tool call
    pub tool: Option<ToolInvocation>,
}

struct Drained {
    text: String,
    first_call: Option<ToolCall>,
}

/// Agent driving a [`GenerativeModel`]
pub struct StreamingAgent {
    model: Arc<dyn GenerativeModel>,
    retry: RetryScheduler,
    timeout: Duration,
}

impl std::fmt::Debug for StreamingAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingAgent")
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl StreamingAgent {
    /// Create agent with default retry policy and deadline
    #[must_use]
    pub fn new(model: Arc<dyn GenerativeModel>) -> Self {
        Self {
            model,
            retry: RetryScheduler::default(),
            timeout: DEFAULT_TURN_TIMEOUT,
        }
    }

    /// With retry scheduler
    #[inline]
    #[must_use]
    pub fn with_retry(mut self, retry: RetryScheduler) -> Self {
        self.retry = retry;
        self
    }

    /// With turn deadline
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run one exchange, emitting chunks to `events`
    ///
    /// Failures never escape: they end the turn in `Error` with exactly one
    /// error chunk. A tool call that already ran is still reported.
    pub async fn run(
        &self,
        request: TurnRequest,
        tools: &ToolTable,
        events: &mpsc::Sender<TurnEvent>,
    ) -> ExchangeOutcome {
        let mut tracker = StateTracker::new();
        let mut forwarded = String::new();
        let mut tool = None;

        let deadline = tokio::time::timeout(
            self.timeout,
            self.exchange(request, tools, events, &mut tracker, &mut forwarded, &mut tool),
        );
        let result = match deadline.await {
            Ok(result) => result,
            Err(_) => Err(AgentError::Timeout),
        };

        if let Err(err) = result {
            let chunk = if err.is_timeout() {
                error!(timeout_secs = self.timeout.as_secs(), state = ?tracker.current(), "turn timed out");
                TIMEOUT_CHUNK.to_string()
            } else {
                error!(error = %err, state = ?tracker.current(), "exchange failed");
                format!("{FAILURE_PREFIX}{err}")
            };
            tracker.fail();
            forwarded.push_str(&chunk);
            emit(events, TurnEvent::Chunk(chunk)).await;
        }

        ExchangeOutcome {
            state: tracker.current(),
            path: tracker.path().to_vec(),
            forwarded,
            tool,
        }
    }

    async fn exchange(
        &self,
        request: TurnRequest,
        tools: &ToolTable,
        events: &mpsc::Sender<TurnEvent>,
        tracker: &mut StateTracker,
        forwarded: &mut String,
        invoked: &mut Option<ToolInvocation>,
    ) -> Result<(), AgentError> {
        tracker.advance(AgentState::Sending)?;
        let stream = self.open(&request).await?;
        tracker.advance(AgentState::StreamingText)?;

        let first = drain(stream, true, events, tracker, forwarded).await?;
        let Some(call) = first.first_call else {
            tracker.advance(AgentState::Done)?;
            info!(chars = forwarded.len(), "turn complete");
            return Ok(());
        };

        tracker.advance(AgentState::ExecutingTool)?;
        info!(tool = %call.name, id = %call.id, "executing tool call");
        let result = tools.invoke(&call).await;
        let follow_up = request.follow_up(&first.text, &call, result.clone());
        let name = call.name.clone();
        *invoked = Some(ToolInvocation { call, result });

        tracker.advance(AgentState::SendingToolResult)?;
        let stream = self.open(&follow_up).await?;
        tracker.advance(AgentState::StreamingText)?;

        drain(stream, false, events, tracker, forwarded).await?;
        tracker.advance(AgentState::Done)?;
        info!(tool = %name, "turn complete after tool call");

        Ok(())
    }

    async fn open(&self, request: &TurnRequest) -> Result<ModelStream, ModelError> {
        self.retry
            .run(|| self.model.open_stream(request.clone()))
            .await
    }
}

/// Consume a stream, forwarding text until the first tool call
///
/// With `accept_calls` false every tool call is ignored and all text is
/// forwarded.
async fn drain(
    mut stream: ModelStream,
    accept_calls: bool,
    events: &mpsc::Sender<TurnEvent>,
    tracker: &mut StateTracker,
    forwarded: &mut String,
) -> Result<Drained, AgentError> {
    let mut text = String::new();
    let mut first_call: Option<ToolCall> = None;

    while let Some(delta) = stream.next().await {
        let delta = delta?;

        if let Some(call) = delta.tool_call {
            if !accept_calls {
                debug!(tool = %call.name, "ignoring tool call in follow-up stream");
            } else if first_call.is_some() {
                warn!(tool = %call.name, "ignoring additional tool call");
            } else {
                debug!(tool = %call.name, "tool call detected, withholding text");
                tracker.advance(AgentState::ToolDetected)?;
                first_call = Some(call);
            }
        }

        if let Some(fragment) = delta.text {
            text.push_str(&fragment);
            if first_call.is_none() {
                forwarded.push_str(&fragment);
                emit(events, TurnEvent::Chunk(fragment)).await;
            }
        }
    }

    Ok(Drained { text, first_call })
}

async fn emit(events: &mpsc::Sender<TurnEvent>, event: TurnEvent) {
    if events.send(event).await.is_err() {
        debug!("turn listener dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_from_excerpt_drops_text() {
        let excerpt = RetrievedExcerpt {
            title: "Código de Obras".to_string(),
            category: LawCategory::CodigoObras,
            excerpt: "Art. 22".to_string(),
        };
        assert_eq!(
            Source::from(&excerpt),
            Source {
                title: "Código de Obras".to_string(),
                category: LawCategory::CodigoObras,
            }
        );
    }
}
