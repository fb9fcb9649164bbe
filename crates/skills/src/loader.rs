//! Layered skill discovery.
//!
//! Two tiers are walked in order: the managed tier
//! (`~/.mini-agent/skills`) then the workspace tier
//! (`<workspace>/skills`).  At the top level of each tier any `*.md` file
//! is a skill; subdirectories contribute their `SKILL.md` and are
//! recursed into.  `node_modules` and dot-directories are skipped.
//! Same-name collisions resolve to the later tier.

use std::collections::HashMap;
use std::path::Path;

use crate::commands::build_commands;
use crate::frontmatter::parse_frontmatter;
use crate::types::{SkillCommand, SkillEntry, SkillSource};

/// The loaded skill universe: entries plus the derived command table.
#[derive(Debug, Default)]
pub struct SkillSet {
    entries: Vec<SkillEntry>,
    commands: Vec<SkillCommand>,
}

impl SkillSet {
    /// Walk both tiers and build the command table.
    pub fn load(managed_dir: &Path, workspace_dir: &Path) -> Self {
        let mut by_name: HashMap<String, SkillEntry> = HashMap::new();

        for (dir, source) in [
            (managed_dir, SkillSource::Managed),
            (workspace_dir, SkillSource::Workspace),
        ] {
            for entry in load_tier(dir, source) {
                by_name.insert(entry.name.clone(), entry);
            }
        }

        let mut entries: Vec<SkillEntry> = by_name.into_values().collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        let commands = build_commands(&entries);
        tracing::debug!(
            skills = entries.len(),
            commands = commands.len(),
            "skills loaded"
        );

        Self { entries, commands }
    }

    pub fn entries(&self) -> &[SkillEntry] {
        &self.entries
    }

    pub fn commands(&self) -> &[SkillCommand] {
        &self.commands
    }

    pub fn get(&self, name: &str) -> Option<&SkillEntry> {
        self.entries.iter().find(|e| e.name == name)
    }
}

fn load_tier(dir: &Path, source: SkillSource) -> Vec<SkillEntry> {
    let mut entries = Vec::new();
    if !dir.is_dir() {
        return entries;
    }

    let read_dir = match std::fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "failed to read skills tier");
            return entries;
        }
    };

    for item in read_dir.flatten() {
        let path = item.path();
        let name = item.file_name().to_string_lossy().to_string();

        if path.is_dir() {
            if should_skip_dir(&name) {
                continue;
            }
            load_skill_dir(&path, source, &mut entries);
        } else if name.ends_with(".md") {
            let default_name = name.trim_end_matches(".md").to_string();
            if let Some(entry) = load_skill_file(&path, &default_name, source) {
                entries.push(entry);
            }
        }
    }

    entries
}

/// Load `SKILL.md` from a skill directory and recurse into nested ones.
fn load_skill_dir(dir: &Path, source: SkillSource, out: &mut Vec<SkillEntry>) {
    let skill_md = dir.join("SKILL.md");
    if skill_md.is_file() {
        let default_name = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if let Some(entry) = load_skill_file(&skill_md, &default_name, source) {
            out.push(entry);
        }
    }

    let Ok(read_dir) = std::fs::read_dir(dir) else {
        return;
    };
    for item in read_dir.flatten() {
        let path = item.path();
        if !path.is_dir() {
            continue;
        }
        let name = item.file_name().to_string_lossy().to_string();
        if should_skip_dir(&name) {
            continue;
        }
        load_skill_dir(&path, source, out);
    }
}

fn should_skip_dir(name: &str) -> bool {
    name == "node_modules" || name.starts_with('.')
}

/// Parse one skill file.  A missing description rejects the file.
fn load_skill_file(path: &Path, default_name: &str, source: SkillSource) -> Option<SkillEntry> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "unreadable skill file");
            return None;
        }
    };

    let (fm, _body) = parse_frontmatter(&content);
    let fm = fm.unwrap_or_default();

    let description = match fm.description {
        Some(d) if !d.trim().is_empty() => d,
        _ => {
            tracing::warn!(path = %path.display(), "skipping skill without description");
            return None;
        }
    };

    let name = fm
        .name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| default_name.to_string());

    Some(SkillEntry {
        name,
        description,
        path: path.to_path_buf(),
        source,
        user_invocable: fm.user_invocable,
        disable_model_invocation: fm.disable_model_invocation,
    })
}
