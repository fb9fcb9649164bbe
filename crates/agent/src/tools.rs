//! Agent-side built-in tools.
//!
//! These need runtime services the generic tool crate cannot see: the
//! heartbeat task file location and the memory journal.  Registering
//! them gives the model a way to tick off heartbeat tasks and to
//! capture durable notes.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use ma_domain::error::Result;
use ma_memory::{MemorySource, MemoryStore};
use ma_tools::{Tool, ToolContext};

use crate::heartbeat::mark_task_completed;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// complete_task
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
struct CompleteTaskArgs {
    /// 1-based line number in the task file.
    line: usize,
}

/// Marks a heartbeat task complete by replacing the first `[ ]` on its
/// line with `[x]`.
pub struct CompleteTaskTool {
    task_file: PathBuf,
}

impl CompleteTaskTool {
    pub fn new(task_file: impl Into<PathBuf>) -> Self {
        Self {
            task_file: task_file.into(),
        }
    }
}

#[async_trait::async_trait]
impl Tool for CompleteTaskTool {
    fn name(&self) -> &str {
        "complete_task"
    }

    fn description(&self) -> &str {
        "Mark a task in the heartbeat task file as completed, identified by its 1-based line number."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "line": {
                    "type": "integer",
                    "description": "1-based line number of the task to mark complete"
                }
            },
            "required": ["line"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<String> {
        let args: CompleteTaskArgs = serde_json::from_value(args)?;
        if mark_task_completed(&self.task_file, args.line)? {
            Ok(format!("marked line {} complete", args.line))
        } else {
            Ok(format!("line {} has no open checkbox", args.line))
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// save_memory
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
struct SaveMemoryArgs {
    content: String,
    #[serde(default)]
    tags: Vec<String>,
}

/// Appends a note to the memory journal; later runs retrieve it through
/// keyword search in the system prompt.
pub struct SaveMemoryTool {
    memory: Arc<MemoryStore>,
}

impl SaveMemoryTool {
    pub fn new(memory: Arc<MemoryStore>) -> Self {
        Self { memory }
    }
}

#[async_trait::async_trait]
impl Tool for SaveMemoryTool {
    fn name(&self) -> &str {
        "save_memory"
    }

    fn description(&self) -> &str {
        "Save a durable note to memory so future conversations can recall it. Use short, factual content."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "content": { "type": "string", "description": "The note to remember" },
                "tags": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Optional keywords for retrieval"
                }
            },
            "required": ["content"]
        })
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<String> {
        let args: SaveMemoryArgs = serde_json::from_value(args)?;
        let entry = self.memory.save(args.content, MemorySource::Agent, args.tags)?;
        Ok(format!("saved memory {}", entry.id))
    }
}
