use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ma_agent::cli::{self, Cli, Command};
use ma_agent::{runtime, AgentState};
use ma_providers::AnthropicProvider;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Cli::parse();

    let (session, agent) = match args.command {
        Some(Command::Chat { session, agent }) => (session, agent),
        None => (None, std::env::var("OPENCLAW_MINI_AGENT_ID").ok()),
    };

    let workspace = std::env::current_dir().context("resolving working directory")?;
    let home = dirs::home_dir();

    let mut config = cli::load_config(&workspace, home.as_deref())?;
    if let Some(agent) = agent {
        config.agent_id = agent;
    }

    let api_key = std::env::var(&config.model.api_key_env).with_context(|| {
        format!(
            "environment variable {} is required for the {} provider",
            config.model.api_key_env, config.model.provider
        )
    })?;
    let provider = Arc::new(AnthropicProvider::new(api_key, config.model.model.clone())?);

    let state = AgentState::with_home(config, workspace, provider, home)?;
    let heartbeat = runtime::start_heartbeat(&state);

    let result = cli::chat::chat(state, session.unwrap_or_else(|| "main".into())).await;

    if let Some(heartbeat) = heartbeat {
        heartbeat.stop();
    }
    result
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,ma_agent=info")),
        )
        .with_writer(std::io::stderr)
        .init();
}
