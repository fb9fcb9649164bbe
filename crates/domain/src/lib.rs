//! Shared types for the mini-agent runtime: the error taxonomy, the
//! message/content model, the provider stream contract, cancellation
//! tokens, and the configuration tree.

pub mod cancel;
pub mod config;
pub mod error;
pub mod message;
pub mod stream;

pub use cancel::CancelToken;
pub use error::{Error, Result};
pub use message::{ContentBlock, Message, MessageContent, Role, ToolCall, ToolDefinition};
pub use stream::{BoxStream, StreamEvent};
