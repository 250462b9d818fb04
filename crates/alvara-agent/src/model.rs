//! Generative model boundary
//!
//! A model is asked for one streamed turn at a time. The request carries the
//! whole conversation, so implementations hold no chat state.

use crate::error::ModelError;
use crate::tools::ToolDeclaration;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Speaker of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Analyst
    User,
    /// Assistant
    Model,
}

/// Tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Tool name
    pub name: String,
    /// Arguments object
    #[serde(default)]
    pub args: serde_json::Value,
    /// Call id echoed in the response
    pub id: String,
}

/// Piece of a turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Part {
    /// Plain text
    Text(String),
    /// Attached document
    InlineData {
        /// MIME type
        mime_type: String,
        /// Base64 payload
        data: String,
    },
    /// Tool call made by the model
    FunctionCall(ToolCall),
    /// Result of a tool call
    FunctionResponse {
        /// Tool name
        name: String,
        /// Id of the answered call
        id: String,
        /// Handler output
        result: String,
    },
}

/// One message of the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    /// Speaker
    pub role: Role,
    /// Content
    pub parts: Vec<Part>,
}

impl Turn {
    /// Text-only turn
    #[must_use]
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![Part::Text(text.into())],
        }
    }

    /// Concatenated text parts
    #[must_use]
    pub fn joined_text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// Everything needed to open one streamed turn
#[derive(Debug, Clone, PartialEq)]
pub struct TurnRequest {
    /// Instruction steering the model
    pub system_instruction: String,
    /// Conversation so far
    pub prior_turns: Vec<Turn>,
    /// Parts of the new user turn
    pub new_turn_parts: Vec<Part>,
    /// Sampling temperature
    pub temperature: f32,
    /// Tools the model may call
    pub tools: Vec<ToolDeclaration>,
}

impl TurnRequest {
    /// Request answering `call` with `result`
    ///
    /// The previous user turn and the model's partial answer move into the
    /// history.
    #[must_use]
    pub fn follow_up(&self, model_text: &str, call: &ToolCall, result: String) -> Self {
        let mut prior_turns = self.prior_turns.clone();
        prior_turns.push(Turn {
            role: Role::User,
            parts: self.new_turn_parts.clone(),
        });

        let mut model_parts = Vec::with_capacity(2);
        if !model_text.is_empty() {
            model_parts.push(Part::Text(model_text.to_string()));
        }
        model_parts.push(Part::FunctionCall(call.clone()));
        prior_turns.push(Turn {
            role: Role::Model,
            parts: model_parts,
        });

        Self {
            system_instruction: self.system_instruction.clone(),
            prior_turns,
            new_turn_parts: vec![Part::FunctionResponse {
                name: call.name.clone(),
                id: call.id.clone(),
                result,
            }],
            temperature: self.temperature,
            tools: self.tools.clone(),
        }
    }
}

/// Increment of a streamed answer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamDelta {
    /// Text fragment
    pub text: Option<String>,
    /// Tool call
    pub tool_call: Option<ToolCall>,
}

impl StreamDelta {
    /// Text-only delta
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            tool_call: None,
        }
    }

    /// Tool-call-only delta
    #[must_use]
    pub fn tool_call(call: ToolCall) -> Self {
        Self {
            text: None,
            tool_call: Some(call),
        }
    }
}

/// Stream of answer increments
pub type ModelStream = BoxStream<'static, Result<StreamDelta, ModelError>>;

/// Streaming generative model
#[async_trait::async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Open a streamed turn
    async fn open_stream(&self, request: TurnRequest) -> Result<ModelStream, ModelError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn follow_up_moves_turn_into_history() {
        let request = TurnRequest {
            system_instruction: "sys".to_string(),
            prior_turns: vec![Turn::text(Role::User, "oi"), Turn::text(Role::Model, "olá")],
            new_turn_parts: vec![Part::Text("salve a auditoria".to_string())],
            temperature: 0.1,
            tools: Vec::new(),
        };
        let call = ToolCall {
            name: "save_audit_parameters".to_string(),
            args: serde_json::json!({"protocol_number": "123"}),
            id: "call-1".to_string(),
        };

        let next = request.follow_up("", &call, "ok".to_string());

        assert_eq!(next.prior_turns.len(), 4);
        assert_eq!(next.prior_turns[2].joined_text(), "salve a auditoria");
        assert_eq!(next.prior_turns[3].parts, vec![Part::FunctionCall(call)]);
        assert_eq!(
            next.new_turn_parts,
            vec![Part::FunctionResponse {
                name: "save_audit_parameters".to_string(),
                id: "call-1".to_string(),
                result: "ok".to_string(),
            }]
        );
    }
}
