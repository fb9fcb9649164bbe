//! Command-line surface.

pub mod chat;

use std::path::Path;

use clap::{Parser, Subcommand};

use ma_domain::config::AgentConfig;
use ma_domain::error::{Error, Result};

#[derive(Debug, Parser)]
#[command(name = "mini-agent", version, about = "A small tool-using agent runtime")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Interactive chat with the agent.
    Chat {
        /// Session id (defaults to "main").
        session: Option<String>,
        /// Agent identity.
        #[arg(long, env = "OPENCLAW_MINI_AGENT_ID")]
        agent: Option<String>,
    },
}

/// Load configuration, consulting the user home first and letting the
/// workspace override it.
pub fn load_config(workspace: &Path, home: Option<&Path>) -> Result<AgentConfig> {
    let mut candidates = Vec::new();
    if let Some(home) = home {
        candidates.push(home.join(".mini-agent").join("config.toml"));
    }
    candidates.push(workspace.join(".mini-agent").join("config.toml"));

    // Later candidates win; the last readable file is used whole.
    let mut chosen: Option<AgentConfig> = None;
    for path in candidates {
        if !path.is_file() {
            continue;
        }
        let raw = std::fs::read_to_string(&path).map_err(Error::Io)?;
        let config: AgentConfig = toml::from_str(&raw)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        tracing::debug!(path = %path.display(), "config loaded");
        chosen = Some(config);
    }

    Ok(chosen.unwrap_or_default())
}
