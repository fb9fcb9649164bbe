//! Heartbeat task file parsing.
//!
//! The task file is a markdown list.  `- [ ] …` and `- [x] …` carry an
//! explicit completed flag; bare `- …` items count as incomplete.  Blank
//! lines and `#` headings are skipped.  Line numbers are 1-based so items
//! can be marked complete in place.

use std::path::Path;

use ma_domain::error::{Error, Result};

/// One parsed task line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatTask {
    pub description: String,
    pub completed: bool,
    /// The original line, untrimmed.
    pub raw: String,
    /// 1-based line number in the file.
    pub line: usize,
}

/// Parse tasks out of markdown content.
pub fn parse_tasks(content: &str) -> Vec<HeartbeatTask> {
    let mut tasks = Vec::new();

    for (idx, raw_line) in content.lines().enumerate() {
        let trimmed = raw_line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let Some(item) = trimmed.strip_prefix("- ") else {
            continue;
        };

        let (completed, description) = match checkbox(item) {
            Some((done, rest)) => (done, rest),
            None => (false, item),
        };

        tasks.push(HeartbeatTask {
            description: description.trim().to_string(),
            completed,
            raw: raw_line.to_string(),
            line: idx + 1,
        });
    }

    tasks
}

/// Split a `[ ]` / `[x]` checkbox off a list item, if present.
fn checkbox(item: &str) -> Option<(bool, &str)> {
    let rest = item.strip_prefix('[')?;
    let mut chars = rest.chars();
    let mark = chars.next()?;
    if chars.next()? != ']' {
        return None;
    }
    let done = match mark {
        ' ' => false,
        'x' | 'X' => true,
        _ => return None,
    };
    Some((done, &rest[2..]))
}

/// Mark the task at `line` (1-based) completed by replacing the first
/// `[ ]` on that line with `[x]`.  Returns whether a replacement
/// happened.
pub fn mark_task_completed(path: &Path, line: usize) -> Result<bool> {
    let content = std::fs::read_to_string(path).map_err(Error::Io)?;
    let had_trailing_newline = content.ends_with('\n');

    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
    let Some(target) = line.checked_sub(1).and_then(|i| lines.get_mut(i)) else {
        return Ok(false);
    };

    if !target.contains("[ ]") {
        return Ok(false);
    }
    *target = target.replacen("[ ]", "[x]", 1);

    let mut rewritten = lines.join("\n");
    if had_trailing_newline {
        rewritten.push('\n');
    }
    std::fs::write(path, rewritten).map_err(Error::Io)?;
    Ok(true)
}
