//! Built-in tools: workspace-constrained file read/write and a shell
//! exec tool.
//!
//! Paths are validated against the workspace root: absolute paths and
//! `..` components are rejected before any filesystem access.  The exec
//! tool runs `sh -c` with a hard timeout and honors the run's
//! cancellation token.

use std::path::{Component, Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;

use ma_domain::error::{Error, Result};

use crate::tool::{Tool, ToolContext};

/// Hard ceiling for exec runtime.
const EXEC_TIMEOUT_SECS: u64 = 60;
/// Tool results larger than this are tail-truncated.
const MAX_OUTPUT_CHARS: usize = 50_000;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Path validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Validate a requested path and resolve it inside the workspace root.
pub fn validate_path(workspace: &Path, requested: &str) -> Result<PathBuf> {
    let requested_path = Path::new(requested);
    if requested_path.is_absolute() {
        return Err(Error::Other(format!(
            "absolute paths are not allowed; use a path relative to the workspace root (got '{requested}')"
        )));
    }
    for component in requested_path.components() {
        if matches!(component, Component::ParentDir) {
            return Err(Error::Other(format!(
                "path '{requested}' contains '..' which is not allowed"
            )));
        }
    }
    Ok(workspace.join(requested_path))
}

fn truncate_output(mut out: String) -> String {
    if out.len() > MAX_OUTPUT_CHARS {
        let mut cut = MAX_OUTPUT_CHARS;
        while !out.is_char_boundary(cut) {
            cut -= 1;
        }
        out.truncate(cut);
        out.push_str("\n... [output truncated]");
    }
    out
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// read_file
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
struct ReadFileArgs {
    path: String,
}

pub struct ReadFileTool;

#[async_trait::async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a text file from the workspace. Path is relative to the workspace root."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Relative file path" }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String> {
        let args: ReadFileArgs = serde_json::from_value(args)?;
        let path = validate_path(&ctx.workspace, &args.path)?;
        let content = tokio::fs::read_to_string(&path).await.map_err(Error::Io)?;
        Ok(truncate_output(content))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// write_file
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
struct WriteFileArgs {
    path: String,
    content: String,
}

pub struct WriteFileTool;

#[async_trait::async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write a text file in the workspace, creating parent directories as needed."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Relative file path" },
                "content": { "type": "string", "description": "Full file content" }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String> {
        let args: WriteFileArgs = serde_json::from_value(args)?;
        let path = validate_path(&ctx.workspace, &args.path)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(Error::Io)?;
        }
        tokio::fs::write(&path, &args.content).await.map_err(Error::Io)?;
        Ok(format!("wrote {} bytes to {}", args.content.len(), args.path))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// exec
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Deserialize)]
struct ExecArgs {
    command: String,
}

pub struct ExecTool;

#[async_trait::async_trait]
impl Tool for ExecTool {
    fn name(&self) -> &str {
        "exec"
    }

    fn description(&self) -> &str {
        "Run a shell command in the workspace and return its combined output."
    }

    fn parameters(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "description": "Shell command line" }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<String> {
        let args: ExecArgs = serde_json::from_value(args)?;

        let mut cmd = tokio::process::Command::new("sh");
        cmd.arg("-c")
            .arg(&args.command)
            .current_dir(&ctx.workspace)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(Error::Io)?;

        let output = tokio::select! {
            result = child.wait_with_output() => result.map_err(Error::Io)?,
            _ = ctx.cancel.cancelled() => return Err(Error::Cancelled),
            _ = tokio::time::sleep(std::time::Duration::from_secs(EXEC_TIMEOUT_SECS)) => {
                return Err(Error::Timeout(format!(
                    "command exceeded {EXEC_TIMEOUT_SECS}s: {}", args.command
                )));
            }
        };

        let mut text = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&stderr);
        }
        if !output.status.success() {
            text.push_str(&format!("\n[exit code: {}]", output.status.code().unwrap_or(-1)));
        }

        Ok(truncate_output(text))
    }
}
