//! Slash-command table and input resolution.
//!
//! Every user-invocable skill maps to a sanitized command name.  Input
//! beginning with `/` is resolved against the table, either directly
//! (`/<cmd> [args]`) or through the explicit dispatcher
//! (`/skill <name> [args]`).  On a hit, the user message is rewritten to
//! point the model at the skill.

use crate::types::{SkillCommand, SkillEntry};

const MAX_COMMAND_LEN: usize = 32;
const MAX_DESCRIPTION_LEN: usize = 100;

/// A resolved slash-command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkillInvocation {
    pub skill_name: String,
    pub args: String,
}

/// Sanitize a skill name into a command name: lowercased, runs of
/// characters outside `[a-z0-9_]` collapsed to a single `_`, at most 32
/// chars.
pub fn sanitize_command_name(name: &str) -> String {
    let mut out = String::new();
    let mut pending_sep = false;
    for c in name.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(c);
        } else {
            pending_sep = true;
        }
    }
    out.truncate(MAX_COMMAND_LEN);
    out
}

fn truncate_description(description: &str) -> String {
    if description.len() <= MAX_DESCRIPTION_LEN {
        description.to_string()
    } else {
        let mut cut = MAX_DESCRIPTION_LEN;
        while !description.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}…", &description[..cut])
    }
}

/// Build the command table from user-invocable entries.  Collisions get
/// `_2`, `_3`, … suffixes; names stay within the length cap.
pub fn build_commands(entries: &[SkillEntry]) -> Vec<SkillCommand> {
    let mut commands: Vec<SkillCommand> = Vec::new();

    for entry in entries.iter().filter(|e| e.user_invocable) {
        let base = sanitize_command_name(&entry.name);
        let base = if base.is_empty() { "skill".to_string() } else { base };

        let mut candidate = base.clone();
        let mut n = 1;
        while commands.iter().any(|c| c.command == candidate) {
            n += 1;
            let suffix = format!("_{n}");
            let mut stem = base.clone();
            stem.truncate(MAX_COMMAND_LEN - suffix.len());
            candidate = format!("{stem}{suffix}");
        }

        commands.push(SkillCommand {
            command: candidate,
            skill_name: entry.name.clone(),
            description: truncate_description(&entry.description),
        });
    }

    commands
}

/// Normalize for fuzzy lookup: spaces and underscores become hyphens.
fn hyphen_normalize(s: &str) -> String {
    s.to_lowercase().replace([' ', '_'], "-")
}

fn lookup<'a>(commands: &'a [SkillCommand], name: &str) -> Option<&'a SkillCommand> {
    commands
        .iter()
        .find(|c| c.command.eq_ignore_ascii_case(name))
        .or_else(|| {
            commands
                .iter()
                .find(|c| c.skill_name.eq_ignore_ascii_case(name))
        })
        .or_else(|| {
            let normalized = hyphen_normalize(name);
            commands.iter().find(|c| {
                hyphen_normalize(&c.command) == normalized
                    || hyphen_normalize(&c.skill_name) == normalized
            })
        })
}

/// Resolve slash input against the command table.
///
/// Returns `None` for non-slash input and for unknown commands (which
/// pass through to the model unchanged).
pub fn resolve_command(commands: &[SkillCommand], input: &str) -> Option<SkillInvocation> {
    let input = input.trim();
    let stripped = input.strip_prefix('/')?;
    if stripped.is_empty() {
        return None;
    }

    let (head, rest) = match stripped.split_once(char::is_whitespace) {
        Some((h, r)) => (h, r.trim_start()),
        None => (stripped, ""),
    };

    // `/skill <name> [args]` — explicit dispatch.
    if head.eq_ignore_ascii_case("skill") {
        let (name, args) = match rest.split_once(char::is_whitespace) {
            Some((n, a)) => (n, a.trim_start()),
            None => (rest, ""),
        };
        if name.is_empty() {
            return None;
        }
        return lookup(commands, name).map(|c| SkillInvocation {
            skill_name: c.skill_name.clone(),
            args: args.to_string(),
        });
    }

    lookup(commands, head).map(|c| SkillInvocation {
        skill_name: c.skill_name.clone(),
        args: rest.to_string(),
    })
}

/// The rewritten user message for a resolved invocation.
pub fn rewrite_input(skill_name: &str, args: &str) -> String {
    format!("Use the \"{skill_name}\" skill for this request.\n\nUser input:\n{args}")
}
