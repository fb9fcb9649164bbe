//! Anthropic-native adapter.
//!
//! Implements the Anthropic Messages API including tool use and SSE
//! streaming.  The system prompt goes into the top-level `system` field;
//! tool results travel as `tool_result` content blocks on user messages,
//! which matches the runtime's message model directly.

use serde_json::Value;

use ma_domain::error::{Error, Result};
use ma_domain::stream::{BoxStream, StreamEvent};
use ma_domain::{ContentBlock, Message, MessageContent, Role, ToolCall, ToolDefinition};

use crate::sse::{from_reqwest, sse_event_stream};
use crate::traits::{ChatRequest, ChatResponse, LlmProvider};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// An LLM provider adapter for the Anthropic Messages API.
pub struct AnthropicProvider {
    id: String,
    base_url: String,
    api_key: String,
    default_model: String,
    client: reqwest::Client,
}

// ── JSON field helpers ─────────────────────────────────────────────

fn str_field<'a>(v: &'a Value, name: &str) -> Option<&'a str> {
    v.get(name).and_then(Value::as_str)
}

fn str_field_or<'a>(v: &'a Value, name: &str, default: &'a str) -> &'a str {
    str_field(v, name).unwrap_or(default)
}

fn index_field(v: &Value) -> u64 {
    v.get("index").and_then(Value::as_u64).unwrap_or(0)
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>, default_model: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            id: "anthropic".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            default_model: default_model.into(),
            client,
        })
    }

    /// Override the API base URL (testing, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn messages_url(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }

    fn authed_post(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .post(url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
    }

    fn build_messages_body(&self, req: &ChatRequest, stream: bool) -> Value {
        let model = req.model.as_deref().unwrap_or(&self.default_model);
        let api_messages: Vec<Value> = req.messages.iter().map(message_to_anthropic).collect();

        let mut body = serde_json::json!({
            "model": model,
            "messages": api_messages,
            "stream": stream,
            "max_tokens": req.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        });

        if !req.system.is_empty() {
            body["system"] = Value::String(req.system.clone());
        }
        if !req.tools.is_empty() {
            body["tools"] = req.tools.iter().map(tool_to_anthropic).collect();
        }
        if let Some(temperature) = req.temperature {
            body["temperature"] = serde_json::json!(temperature);
        }

        body
    }

    fn provider_error(&self, status: reqwest::StatusCode, body: String) -> Error {
        Error::Provider {
            provider: self.id.clone(),
            message: format!("HTTP {} - {}", status.as_u16(), body),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message serialization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn message_to_anthropic(msg: &Message) -> Value {
    let role = match msg.role {
        Role::User => "user",
        Role::Assistant => "assistant",
    };
    let content = match &msg.content {
        MessageContent::Text(t) => Value::String(t.clone()),
        MessageContent::Blocks(blocks) => blocks.iter().map(block_to_anthropic).collect(),
    };
    serde_json::json!({ "role": role, "content": content })
}

fn block_to_anthropic(block: &ContentBlock) -> Value {
    match block {
        ContentBlock::Text { text } => serde_json::json!({
            "type": "text",
            "text": text,
        }),
        ContentBlock::ToolUse { id, name, input } => serde_json::json!({
            "type": "tool_use",
            "id": id,
            "name": name,
            "input": input,
        }),
        ContentBlock::ToolResult {
            tool_use_id,
            content,
            ..
        } => serde_json::json!({
            "type": "tool_result",
            "tool_use_id": tool_use_id,
            "content": content,
        }),
    }
}

fn tool_to_anthropic(tool: &ToolDefinition) -> Value {
    serde_json::json!({
        "name": tool.name,
        "description": tool.description,
        "input_schema": tool.parameters,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response deserialization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn parse_anthropic_response(body: &Value) -> ChatResponse {
    let mut text = String::new();
    let mut tool_calls = Vec::new();

    let blocks = body
        .get("content")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    for block in blocks {
        match str_field_or(block, "type", "") {
            "text" => text.push_str(str_field_or(block, "text", "")),
            "tool_use" => tool_calls.push(ToolCall {
                id: str_field_or(block, "id", "").to_string(),
                name: str_field_or(block, "name", "").to_string(),
                arguments: block
                    .get("input")
                    .cloned()
                    .unwrap_or_else(|| Value::Object(Default::default())),
            }),
            _ => {}
        }
    }

    ChatResponse {
        content: text,
        tool_calls,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Streaming SSE parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Assembly state across raw SSE payloads: accumulated text for the
/// terminal `text_end`, and in-flight tool calls keyed by content-block
/// index.
struct StreamState {
    text: String,
    tool_calls: std::collections::HashMap<u64, PendingToolCall>,
    text_end_emitted: bool,
}

struct PendingToolCall {
    id: String,
    name: String,
    args_json: String,
}

impl StreamState {
    fn new() -> Self {
        Self {
            text: String::new(),
            tool_calls: std::collections::HashMap::new(),
            text_end_emitted: false,
        }
    }

    fn emit_text_end(&mut self, out: &mut Vec<Result<StreamEvent>>) {
        if !self.text_end_emitted {
            self.text_end_emitted = true;
            out.push(Ok(StreamEvent::TextEnd {
                content: self.text.clone(),
            }));
        }
    }

    /// Parse one Anthropic SSE payload into zero or more stream events.
    fn parse(&mut self, data: &str) -> Vec<Result<StreamEvent>> {
        let mut out = Vec::new();

        let v: Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => {
                out.push(Err(Error::Json(e)));
                return out;
            }
        };

        match str_field_or(&v, "type", "") {
            "content_block_start" => {
                let Some(block) = v.get("content_block") else {
                    return out;
                };
                if str_field(block, "type") == Some("tool_use") {
                    let id = str_field_or(block, "id", "").to_string();
                    let name = str_field_or(block, "name", "").to_string();
                    out.push(Ok(StreamEvent::ToolCallStart {
                        id: id.clone(),
                        name: name.clone(),
                    }));
                    self.tool_calls.insert(
                        index_field(&v),
                        PendingToolCall {
                            id,
                            name,
                            args_json: String::new(),
                        },
                    );
                }
            }

            "content_block_delta" => {
                let Some(delta) = v.get("delta") else {
                    return out;
                };
                match str_field_or(delta, "type", "") {
                    "text_delta" => {
                        let text = str_field_or(delta, "text", "");
                        if !text.is_empty() {
                            self.text.push_str(text);
                            out.push(Ok(StreamEvent::TextDelta {
                                delta: text.to_string(),
                            }));
                        }
                    }
                    "input_json_delta" => {
                        if let Some(pending) = self.tool_calls.get_mut(&index_field(&v)) {
                            pending.args_json.push_str(str_field_or(delta, "partial_json", ""));
                        }
                    }
                    _ => {}
                }
            }

            "content_block_stop" => {
                if let Some(pending) = self.tool_calls.remove(&index_field(&v)) {
                    let arguments = serde_json::from_str(&pending.args_json)
                        .unwrap_or_else(|_| Value::Object(Default::default()));
                    out.push(Ok(StreamEvent::ToolCallEnd {
                        tool_call: ToolCall {
                            id: pending.id,
                            name: pending.name,
                            arguments,
                        },
                    }));
                }
            }

            "message_delta" => {
                let stopped = v
                    .get("delta")
                    .and_then(|d| str_field(d, "stop_reason"))
                    .is_some();
                if stopped {
                    self.emit_text_end(&mut out);
                }
            }

            "message_stop" => self.emit_text_end(&mut out),

            "error" => {
                let message = v
                    .get("error")
                    .and_then(|e| str_field(e, "message"))
                    .unwrap_or("unknown error");
                out.push(Err(Error::Provider {
                    provider: "anthropic".into(),
                    message: message.to_string(),
                }));
            }

            // ping / message_start / unknown event types.
            _ => {}
        }

        out
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl LlmProvider for AnthropicProvider {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse> {
        let url = self.messages_url();
        let body = self.build_messages_body(&req, false);
        let cancel = req.cancel.clone();

        tracing::debug!(provider = %self.id, url = %url, "anthropic chat request");

        let request = async {
            let resp = self
                .authed_post(&url)
                .json(&body)
                .send()
                .await
                .map_err(from_reqwest)?;
            let status = resp.status();
            let text = resp.text().await.map_err(from_reqwest)?;
            Ok::<_, Error>((status, text))
        };
        let (status, resp_text) = tokio::select! {
            result = request => result?,
            _ = cancel.cancelled() => return Err(Error::Cancelled),
        };

        if !status.is_success() {
            return Err(self.provider_error(status, resp_text));
        }

        let resp_json: Value = serde_json::from_str(&resp_text)?;
        Ok(parse_anthropic_response(&resp_json))
    }

    async fn chat_stream(
        &self,
        req: ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let url = self.messages_url();
        let body = self.build_messages_body(&req, true);
        let cancel = req.cancel.clone();

        tracing::debug!(provider = %self.id, url = %url, "anthropic stream request");

        let resp = tokio::select! {
            resp = self.authed_post(&url).json(&body).send() => resp.map_err(from_reqwest)?,
            _ = cancel.cancelled() => return Err(Error::Cancelled),
        };

        let status = resp.status();
        if !status.is_success() {
            let err_text = resp.text().await.map_err(from_reqwest)?;
            return Err(self.provider_error(status, err_text));
        }

        let mut state = StreamState::new();
        Ok(sse_event_stream(resp, cancel, move |data| state.parse(data)))
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}
