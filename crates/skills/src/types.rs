use std::path::PathBuf;

use serde::Serialize;

/// Which tier a skill was loaded from.  Workspace wins on name collision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SkillSource {
    Managed,
    Workspace,
}

/// A loaded skill descriptor.
#[derive(Debug, Clone, Serialize)]
pub struct SkillEntry {
    /// Directory basename or frontmatter override.
    pub name: String,
    /// Trigger description advertised to the model.  Mandatory.
    pub description: String,
    /// Absolute path to the detail file (read on demand).
    pub path: PathBuf,
    pub source: SkillSource,
    /// Exposed as a slash-command when true.
    pub user_invocable: bool,
    /// Omitted from the model-visible prompt when true.
    pub disable_model_invocation: bool,
}

/// A sanitized slash-command derived from a user-invocable skill.
#[derive(Debug, Clone, Serialize)]
pub struct SkillCommand {
    /// Unique sanitized command name (lowercase, `[a-z0-9_]`, ≤ 32 chars).
    pub command: String,
    /// The underlying skill name.
    pub skill_name: String,
    /// Description truncated to 100 chars.
    pub description: String,
}
