use serde::Serialize;
use std::pin::Pin;

use crate::message::ToolCall;

/// A boxed async stream, used for LLM streaming responses.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// Events yielded while streaming a model response (provider-agnostic).
///
/// Exhaustion of the stream is the authoritative "stream complete"
/// signal; event iteration is the real-time surface.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum StreamEvent {
    /// Incremental assistant text.
    #[serde(rename = "text_delta")]
    TextDelta { delta: String },

    /// The accumulated text of the turn, emitted once text is complete.
    #[serde(rename = "text_end")]
    TextEnd { content: String },

    /// The model started emitting a tool call.
    #[serde(rename = "toolcall_start")]
    ToolCallStart { id: String, name: String },

    /// A tool call is complete with full arguments.
    #[serde(rename = "toolcall_end")]
    ToolCallEnd { tool_call: ToolCall },
}
