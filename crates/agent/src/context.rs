//! Context-file discovery.
//!
//! Named markdown files (`AGENT.md`, `HEARTBEAT.md`, `CONTEXT.md`) are
//! collected from layered directories -- the user home's `.mini-agent`,
//! the workspace's `.mini-agent`, then the workspace root -- with later
//! layers overriding earlier ones per file name.  The surviving files are
//! concatenated into the system prompt's context section.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// File names consulted in each layer.
pub const CONTEXT_FILE_NAMES: [&str; 3] = ["AGENT.md", "HEARTBEAT.md", "CONTEXT.md"];

/// Resolve the layer directories for a workspace.
fn layers(home: Option<&Path>, workspace: &Path) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Some(home) = home {
        dirs.push(home.join(".mini-agent"));
    }
    dirs.push(workspace.join(".mini-agent"));
    dirs.push(workspace.to_path_buf());
    dirs
}

/// Discover and concatenate the context files.
///
/// Returns an empty string when no file exists in any layer.
pub fn load_context_files(home: Option<&Path>, workspace: &Path) -> String {
    // name -> content; later layers overwrite.
    let mut found: BTreeMap<&str, String> = BTreeMap::new();

    for dir in layers(home, workspace) {
        for name in CONTEXT_FILE_NAMES {
            let path = dir.join(name);
            match std::fs::read_to_string(&path) {
                Ok(content) if !content.trim().is_empty() => {
                    found.insert(name, content);
                }
                Ok(_) => {}
                Err(_) => {}
            }
        }
    }

    if found.is_empty() {
        return String::new();
    }

    // Keep the declaration order of CONTEXT_FILE_NAMES, not BTreeMap order.
    let mut sections = Vec::new();
    for name in CONTEXT_FILE_NAMES {
        if let Some(content) = found.get(name) {
            sections.push(format!("## {name}\n\n{}", content.trim_end()));
        }
    }
    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn empty_when_nothing_exists() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(load_context_files(None, tmp.path()), "");
    }

    #[test]
    fn workspace_root_files_are_found() {
        let tmp = tempfile::tempdir().unwrap();
        write(&tmp.path().join("AGENT.md"), "You are a test agent.");
        let out = load_context_files(None, tmp.path());
        assert!(out.contains("## AGENT.md"));
        assert!(out.contains("You are a test agent."));
    }

    #[test]
    fn workspace_overrides_home() {
        let tmp = tempfile::tempdir().unwrap();
        let home = tmp.path().join("home");
        let ws = tmp.path().join("ws");
        write(&home.join(".mini-agent/AGENT.md"), "home version");
        write(&ws.join("AGENT.md"), "workspace version");

        let out = load_context_files(Some(&home), &ws);
        assert!(out.contains("workspace version"));
        assert!(!out.contains("home version"));
    }

    #[test]
    fn workspace_private_dir_overrides_home_but_not_root() {
        let tmp = tempfile::tempdir().unwrap();
        let home = tmp.path().join("home");
        let ws = tmp.path().join("ws");
        write(&home.join(".mini-agent/CONTEXT.md"), "from home");
        write(&ws.join(".mini-agent/CONTEXT.md"), "from ws private");
        write(&ws.join("CONTEXT.md"), "from ws root");

        let out = load_context_files(Some(&home), &ws);
        assert!(out.contains("from ws root"));
    }

    #[test]
    fn sections_follow_declaration_order() {
        let tmp = tempfile::tempdir().unwrap();
        write(&tmp.path().join("CONTEXT.md"), "ctx");
        write(&tmp.path().join("AGENT.md"), "agent");

        let out = load_context_files(None, tmp.path());
        let agent_pos = out.find("## AGENT.md").unwrap();
        let ctx_pos = out.find("## CONTEXT.md").unwrap();
        assert!(agent_pos < ctx_pos);
    }
}
