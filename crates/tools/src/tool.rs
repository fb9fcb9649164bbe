//! The tool contract.
//!
//! Tools receive JSON arguments and the run's cancellation token, and
//! return their output as a string.  Failures are ordinary `Err` values;
//! the agent loop coerces them into user-visible tool_result bodies
//! rather than aborting the run.

use std::path::PathBuf;

use serde_json::Value;

use ma_domain::error::Result;
use ma_domain::{CancelToken, ToolDefinition};

/// Execution context handed to every tool call.
#[derive(Clone)]
pub struct ToolContext {
    /// Workspace root; file tools must stay inside it.
    pub workspace: PathBuf,
    /// The run's cancellation signal.  Long-running tools are expected
    /// to honor it.
    pub cancel: CancelToken,
}

impl ToolContext {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Trait every tool implements.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema for the tool's arguments.
    fn parameters(&self) -> Value;

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String>;

    /// The definition advertised to the model.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}
