use ma_domain::error::Result;
use ma_domain::stream::{BoxStream, StreamEvent};
use ma_domain::{CancelToken, Message, ToolCall, ToolDefinition};

/// A provider-agnostic chat completion request.
///
/// The system prompt travels separately from the conversation; adapters
/// place it wherever their wire format expects it.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// System prompt for the turn.
    pub system: String,
    /// The conversation messages to send.
    pub messages: Vec<Message>,
    /// Tool definitions the model may invoke.
    pub tools: Vec<ToolDefinition>,
    /// Sampling temperature. `None` lets the provider choose.
    pub temperature: Option<f32>,
    /// Maximum tokens in the response. `None` lets the provider choose.
    pub max_tokens: Option<u32>,
    /// Model identifier override. When `None`, the provider uses its default.
    pub model: Option<String>,
    /// Cancellation signal for the request and its stream.
    pub cancel: CancelToken,
}

/// A provider-agnostic chat completion response (non-streaming).
#[derive(Debug, Clone)]
pub struct ChatResponse {
    /// Textual content of the response.
    pub content: String,
    /// Tool calls emitted by the model.
    pub tool_calls: Vec<ToolCall>,
}

/// Trait every LLM adapter implements.
///
/// `chat_stream` is the primary surface: the agent loop consumes the
/// event stream in emission order and treats stream exhaustion as the
/// settle signal.  `chat` is the non-streaming path used by the
/// compaction summarizer.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Send a chat completion request and wait for the full response.
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse>;

    /// Send a chat completion request and return a stream of events.
    async fn chat_stream(
        &self,
        req: ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>>;

    /// A unique identifier for this provider instance.
    fn provider_id(&self) -> &str;
}
