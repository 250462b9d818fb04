//! Gemini streaming client
//!
//! Posts to `:streamGenerateContent?alt=sse` and turns the server-sent events
//! into [`StreamDelta`]s. The SSE framing is handled by [`SseDecoder`], which
//! knows nothing about HTTP and is fed raw body bytes.

use crate::config::AssistantConfig;
use crate::error::ModelError;
use crate::model::{
    GenerativeModel, ModelStream, Part, Role, StreamDelta, ToolCall, Turn, TurnRequest,
};
use crate::tools::ToolDeclaration;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, error};

// ---------------------------------------------------------------------------
// Request wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireRequest<'a> {
    system_instruction: WireContent<'a>,
    contents: Vec<WireContent<'a>>,
    generation_config: WireGenerationConfig,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
}

#[derive(Debug, Serialize)]
struct WireContent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<Role>,
    parts: Vec<WirePart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
enum WirePart<'a> {
    Text(&'a str),
    InlineData(WireBlob<'a>),
    FunctionCall(WireFunctionCall<'a>),
    FunctionResponse(WireFunctionResponse<'a>),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireBlob<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Debug, Serialize)]
struct WireFunctionCall<'a> {
    name: &'a str,
    args: &'a serde_json::Value,
    id: &'a str,
}

#[derive(Debug, Serialize)]
struct WireFunctionResponse<'a> {
    name: &'a str,
    id: &'a str,
    response: WireResult<'a>,
}

#[derive(Debug, Serialize)]
struct WireResult<'a> {
    result: &'a str,
}

#[derive(Debug, Serialize)]
struct WireGenerationConfig {
    temperature: f32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireTool<'a> {
    function_declarations: &'a [ToolDeclaration],
}

fn wire_part(part: &Part) -> WirePart<'_> {
    match part {
        Part::Text(text) => WirePart::Text(text),
        Part::InlineData { mime_type, data } => WirePart::InlineData(WireBlob { mime_type, data }),
        Part::FunctionCall(call) => WirePart::FunctionCall(WireFunctionCall {
            name: &call.name,
            args: &call.args,
            id: &call.id,
        }),
        Part::FunctionResponse { name, id, result } => {
            WirePart::FunctionResponse(WireFunctionResponse {
                name,
                id,
                response: WireResult { result },
            })
        }
    }
}

fn wire_content(turn: &Turn) -> WireContent<'_> {
    WireContent {
        role: Some(turn.role),
        parts: turn.parts.iter().map(wire_part).collect(),
    }
}

impl<'a> WireRequest<'a> {
    fn from_request(request: &'a TurnRequest) -> Self {
        let mut contents: Vec<WireContent<'a>> =
            request.prior_turns.iter().map(wire_content).collect();
        contents.push(WireContent {
            role: Some(Role::User),
            parts: request.new_turn_parts.iter().map(wire_part).collect(),
        });

        let tools = if request.tools.is_empty() {
            Vec::new()
        } else {
            vec![WireTool {
                function_declarations: &request.tools,
            }]
        };

        Self {
            system_instruction: WireContent {
                role: None,
                parts: vec![WirePart::Text(&request.system_instruction)],
            },
            contents,
            generation_config: WireGenerationConfig {
                temperature: request.temperature,
            },
            tools,
        }
    }
}

// ---------------------------------------------------------------------------
// Response wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct WireChunk {
    #[serde(default)]
    candidates: Vec<WireCandidate>,
    #[serde(default)]
    error: Option<WireError>,
}

#[derive(Debug, Deserialize)]
struct WireCandidate {
    #[serde(default)]
    content: Option<WireResponseContent>,
}

#[derive(Debug, Deserialize)]
struct WireResponseContent {
    #[serde(default)]
    parts: Vec<WireResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResponsePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    function_call: Option<WireCallIn>,
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Deserialize)]
struct WireCallIn {
    name: String,
    #[serde(default)]
    args: serde_json::Value,
    #[serde(default)]
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireError {
    #[serde(default)]
    code: Option<u16>,
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

/// Deltas carried by one SSE event payload
fn decode_event(payload: &str) -> Vec<Result<StreamDelta, ModelError>> {
    if payload.trim() == "[DONE]" {
        return Vec::new();
    }
    let chunk: WireChunk = match serde_json::from_str(payload) {
        Ok(chunk) => chunk,
        Err(e) => return vec![Err(ModelError::Decode(e.to_string()))],
    };

    if let Some(err) = chunk.error {
        let message = match err.status {
            Some(status) => format!("{status}: {}", err.message),
            None => err.message,
        };
        return vec![Err(match err.code {
            Some(status) => ModelError::Status { status, message },
            None => ModelError::Stream(message),
        })];
    }

    chunk
        .candidates
        .into_iter()
        .take(1)
        .filter_map(|candidate| candidate.content)
        .flat_map(|content| content.parts)
        .filter_map(|part| {
            if let Some(call) = part.function_call {
                return Some(Ok(StreamDelta::tool_call(ToolCall {
                    name: call.name,
                    args: call.args,
                    id: call.id.unwrap_or_else(|| ulid::Ulid::new().to_string()),
                })));
            }
            match part.text {
                Some(text) if !part.thought && !text.is_empty() => Some(Ok(StreamDelta::text(text))),
                _ => None,
            }
        })
        .collect()
}

// ---------------------------------------------------------------------------
// SSE framing
// ---------------------------------------------------------------------------

/// Incremental server-sent-events decoder
///
/// Yields the `data:` payload of each complete event. Multi-line data fields
/// are joined with `\n`; comments and other fields are ignored.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Create empty decoder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed body bytes, returning payloads of events completed by them
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut payloads = Vec::new();
        while let Some((end, separator)) = event_boundary(&self.buffer) {
            let block: Vec<u8> = self.buffer.drain(..end + separator).collect();
            if let Some(payload) = event_data(&block[..end]) {
                payloads.push(payload);
            }
        }
        payloads
    }

    /// Payload of a trailing event not followed by a blank line
    pub fn finish(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        event_data(&rest)
    }
}

fn event_boundary(buffer: &[u8]) -> Option<(usize, usize)> {
    let find = |needle: &[u8]| buffer.windows(needle.len()).position(|w| w == needle);
    match (find(b"\n\n"), find(b"\r\n\r\n")) {
        (Some(lf), Some(crlf)) if crlf < lf => Some((crlf, 4)),
        (Some(lf), _) => Some((lf, 2)),
        (None, Some(crlf)) => Some((crlf, 4)),
        (None, None) => None,
    }
}

fn event_data(block: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(block);
    let data: Vec<&str> = text
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|value| value.strip_prefix(' ').unwrap_or(value))
        .collect();
    if data.is_empty() {
        None
    } else {
        Some(data.join("\n"))
    }
}

/// Adapt an SSE body into a delta stream
pub fn sse_deltas<S, B, E>(body: S) -> ModelStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<ModelError> + Send + 'static,
{
    let state = (Box::pin(body), SseDecoder::new(), VecDeque::new(), false);
    futures::stream::unfold(state, |(mut body, mut decoder, mut pending, mut finished)| async move {
        loop {
            if let Some(item) = pending.pop_front() {
                return Some((item, (body, decoder, pending, finished)));
            }
            if finished {
                return None;
            }
            match body.next().await {
                Some(Ok(bytes)) => {
                    for payload in decoder.push(bytes.as_ref()) {
                        pending.extend(decode_event(&payload));
                    }
                }
                Some(Err(err)) => {
                    finished = true;
                    pending.push_back(Err(err.into()));
                }
                None => {
                    finished = true;
                    if let Some(payload) = decoder.finish() {
                        pending.extend(decode_event(&payload));
                    }
                }
            }
        }
    })
    .boxed()
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Default API root
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Streaming Gemini client
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiClient {
    /// Create client for a model
    ///
    /// # Errors
    /// - `ModelError::Config` if the key is empty
    /// - `ModelError::Http` if the HTTP client cannot be built
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, ModelError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(ModelError::Config("gemini api key is required".to_string()));
        }
        // No overall request timeout: the turn deadline bounds the stream.
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
            model: model.into(),
        })
    }

    /// Create client from assistant configuration
    ///
    /// # Errors
    /// - `ModelError::Config` if no key is configured
    pub fn from_config(config: &AssistantConfig) -> Result<Self, ModelError> {
        let key = config
            .gemini_api_key()
            .map_err(|e| ModelError::Config(e.to_string()))?;
        Ok(Self::new(key, config.model.clone())?.with_base_url(config.gemini.base_url.clone()))
    }

    /// Use another API root
    #[inline]
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Model name
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    fn stream_url(&self) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, self.model
        )
    }
}

#[async_trait::async_trait]
impl GenerativeModel for GeminiClient {
    async fn open_stream(&self, request: TurnRequest) -> Result<ModelStream, ModelError> {
        let body = WireRequest::from_request(&request);
        debug!(
            model = %self.model,
            prior_turns = request.prior_turns.len(),
            tools = request.tools.len(),
            "opening model stream"
        );

        let response = self
            .http
            .post(self.stream_url())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), "model stream rejected");
            return Err(ModelError::Status {
                status: status.as_u16(),
                message,
            });
        }

        Ok(sse_deltas(response.bytes_stream()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn decoder_handles_split_events() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"a\":").is_empty());
        assert_eq!(decoder.push(b"1}\n\ndata: {\"b\":2}\r\n\r\n: ping\n\n"), vec![
            "{\"a\":1}".to_string(),
            "{\"b\":2}".to_string(),
        ]);
        assert!(decoder.push(b"data: tail").is_empty());
        assert_eq!(decoder.finish(), Some("tail".to_string()));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn decoder_keeps_multibyte_text_split_across_chunks() {
        let event = "data: {\"t\":\"ventilação\"}\n\n".as_bytes();
        let (head, tail) = event.split_at(22);
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(head).is_empty());
        assert_eq!(decoder.push(tail), vec!["{\"t\":\"ventilação\"}".to_string()]);
    }

    #[test]
    fn event_with_text_and_call() {
        let payload = json!({
            "candidates": [{"content": {"role": "model", "parts": [
                {"text": "Analisando"},
                {"functionCall": {"name": "save_audit_parameters", "args": {"protocol_number": "1"}, "id": "c1"}}
            ]}}]
        })
        .to_string();
        let deltas: Vec<_> = decode_event(&payload).into_iter().map(Result::unwrap).collect();
        assert_eq!(deltas[0], StreamDelta::text("Analisando"));
        let call = deltas[1].tool_call.as_ref().unwrap();
        assert_eq!(call.name, "save_audit_parameters");
        assert_eq!(call.id, "c1");
    }

    #[test]
    fn missing_call_id_gets_generated_one() {
        let payload = json!({
            "candidates": [{"content": {"parts": [{"functionCall": {"name": "t", "args": {}}}]}}]
        })
        .to_string();
        let deltas = decode_event(&payload);
        let call = deltas[0].as_ref().unwrap().tool_call.clone().unwrap();
        assert_eq!(call.id.len(), 26);
    }

    #[test]
    fn error_payload_is_classified() {
        let payload = json!({
            "error": {"code": 429, "message": "Resource has been exhausted", "status": "RESOURCE_EXHAUSTED"}
        })
        .to_string();
        let err = decode_event(&payload).remove(0).unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn request_uses_gemini_field_names() {
        let request = TurnRequest {
            system_instruction: "sys".to_string(),
            prior_turns: vec![Turn::text(Role::Model, "olá")],
            new_turn_parts: vec![
                Part::InlineData {
                    mime_type: "application/pdf".to_string(),
                    data: "JVBERi0=".to_string(),
                },
                Part::Text("analise".to_string()),
            ],
            temperature: 0.1,
            tools: Vec::new(),
        };
        let value = serde_json::to_value(WireRequest::from_request(&request)).unwrap();
        assert_eq!(value["systemInstruction"], json!({"parts": [{"text": "sys"}]}));
        assert_eq!(value["contents"][0]["role"], "model");
        assert_eq!(
            value["contents"][1]["parts"][0],
            json!({"inlineData": {"mimeType": "application/pdf", "data": "JVBERi0="}})
        );
        assert!(value.get("tools").is_none());
    }

    #[test]
    fn function_response_carries_call_id() {
        let part = Part::FunctionResponse {
            name: "save_audit_parameters".to_string(),
            id: "c1".to_string(),
            result: "✅ AUDITORIA SALVA!".to_string(),
        };
        let value = serde_json::to_value(wire_part(&part)).unwrap();
        assert_eq!(
            value,
            json!({"functionResponse": {
                "name": "save_audit_parameters",
                "id": "c1",
                "response": {"result": "✅ AUDITORIA SALVA!"}
            }})
        );
    }

    #[tokio::test]
    async fn body_stream_yields_deltas_in_order() {
        let chunks: Vec<Result<Vec<u8>, ModelError>> = vec![
            Ok(b"data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"a\"}]}}]}\n\nda".to_vec()),
            Ok(b"ta: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"b\"}]}}]}\n\n".to_vec()),
        ];
        let texts: Vec<_> = sse_deltas(futures::stream::iter(chunks))
            .map(|d| d.unwrap().text.unwrap())
            .collect()
            .await;
        assert_eq!(texts, vec!["a", "b"]);
    }

    #[test]
    fn client_requires_key() {
        assert!(matches!(GeminiClient::new(" ", "m"), Err(ModelError::Config(_))));
        let client = GeminiClient::new("k", "gemini-2.5-flash")
            .unwrap()
            .with_base_url("http://localhost:8080/");
        assert_eq!(
            client.stream_url(),
            "http://localhost:8080/models/gemini-2.5-flash:streamGenerateContent?alt=sse"
        );
    }
}
