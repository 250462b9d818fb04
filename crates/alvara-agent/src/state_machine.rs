//! Lifecycle of one agent exchange

use crate::error::AgentError;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// States of a single user turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    /// Nothing sent yet
    Idle,
    /// Opening the model stream
    Sending,
    /// Consuming text deltas
    StreamingText,
    /// A tool call was seen; remaining text is withheld
    ToolDetected,
    /// Running the tool handler
    ExecutingTool,
    /// Returning the tool result to the model
    SendingToolResult,
    /// Turn complete
    Done,
    /// Turn failed
    Error,
}

impl AgentState {
    /// Terminal states accept no transitions
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

/// Validates a state transition
///
/// # Errors
/// - `AgentError::IllegalTransition` if `to` is not reachable from `from`
pub fn validate_transition(from: AgentState, to: AgentState) -> Result<(), AgentError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(AgentError::IllegalTransition { from, to })
    }
}

/// States reachable in one step
#[must_use]
pub fn allowed_transitions(from: AgentState) -> Vec<AgentState> {
    use AgentState::{
        Done, Error, ExecutingTool, Idle, Sending, SendingToolResult, StreamingText, ToolDetected,
    };
    match from {
        Idle => vec![Sending, Error],
        Sending => vec![StreamingText, Error],
        StreamingText => vec![ToolDetected, Done, Error],
        ToolDetected => vec![ExecutingTool, Error],
        ExecutingTool => vec![SendingToolResult, Error],
        SendingToolResult => vec![StreamingText, Error],
        Done | Error => vec![],
    }
}

/// Current state plus the path taken to reach it
#[derive(Debug, Clone)]
pub struct StateTracker {
    current: AgentState,
    path: Vec<AgentState>,
}

impl Default for StateTracker {
    fn default() -> Self {
        Self {
            current: AgentState::Idle,
            path: vec![AgentState::Idle],
        }
    }
}

impl StateTracker {
    /// Tracker in `Idle`
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state
    #[must_use]
    pub fn current(&self) -> AgentState {
        self.current
    }

    /// States visited, oldest first
    #[must_use]
    pub fn path(&self) -> &[AgentState] {
        &self.path
    }

    /// Move to `to`
    ///
    /// # Errors
    /// - `AgentError::IllegalTransition` if the move is not allowed
    pub fn advance(&mut self, to: AgentState) -> Result<(), AgentError> {
        validate_transition(self.current, to)?;
        debug!(from = ?self.current, ?to, "agent transition");
        self.current = to;
        self.path.push(to);
        Ok(())
    }

    /// Move to `Error` unless already terminal
    pub fn fail(&mut self) {
        if !self.current.is_terminal() {
            self.current = AgentState::Error;
            self.path.push(AgentState::Error);
        }
    }
}
