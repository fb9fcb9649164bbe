//! LLM provider adapters and the failure machinery around them: the
//! provider trait, the Anthropic Messages adapter, the error-string
//! classifier, and retry with exponential backoff.

pub mod anthropic;
pub mod classify;
pub mod mock;
pub mod retry;
mod sse;
pub mod traits;

pub use anthropic::AnthropicProvider;
pub use classify::{classify_error, is_context_overflow, ErrorKind};
pub use retry::{retry_async, RetryOptions};
pub use traits::{ChatRequest, ChatResponse, LlmProvider};
