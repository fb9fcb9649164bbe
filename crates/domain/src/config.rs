//! Configuration tree for the mini-agent runtime.
//!
//! Loaded from `config.toml` under `~/.mini-agent/` and the workspace's
//! `.mini-agent/` directory (workspace wins per key group).  Every section
//! is defaultable so an empty file is a valid configuration.

use serde::{Deserialize, Serialize};

/// Token budget below which a run refuses to start.
pub const TOKEN_BUDGET_HARD_FLOOR: usize = 1_000;
/// Token budget below which a warning is logged but the run proceeds.
pub const TOKEN_BUDGET_SOFT_FLOOR: usize = 8_000;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Agent identity; normalized before use as a session-key prefix.
    #[serde(default = "d_agent_id")]
    pub agent_id: String,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            agent_id: d_agent_id(),
            model: ModelConfig::default(),
            run: RunConfig::default(),
            tools: ToolsConfig::default(),
            heartbeat: HeartbeatConfig::default(),
        }
    }
}

fn d_agent_id() -> String {
    "main".into()
}

impl AgentConfig {
    /// Validate the token budget against the hard floor.  The soft floor
    /// only produces a warning at orchestrator construction.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.run.token_budget < TOKEN_BUDGET_HARD_FLOOR {
            return Err(crate::error::Error::Config(format!(
                "token_budget {} is below the hard floor of {}",
                self.run.token_budget, TOKEN_BUDGET_HARD_FLOOR
            )));
        }
        if let Some(ref hours) = self.heartbeat.active_hours {
            hours.parsed()?;
        }
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Model
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "d_provider")]
    pub provider: String,
    #[serde(default = "d_model")]
    pub model: String,
    /// Environment variable holding the provider API key.
    #[serde(default = "d_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "d_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "d_temperature")]
    pub temperature: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: d_provider(),
            model: d_model(),
            api_key_env: d_api_key_env(),
            max_tokens: d_max_tokens(),
            temperature: d_temperature(),
        }
    }
}

fn d_provider() -> String {
    "anthropic".into()
}
fn d_model() -> String {
    "claude-sonnet-4-20250514".into()
}
fn d_api_key_env() -> String {
    "ANTHROPIC_API_KEY".into()
}
fn d_max_tokens() -> u32 {
    4096
}
fn d_temperature() -> f32 {
    0.7
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Run
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Hard ceiling on agent-loop turns per run.
    #[serde(default = "d_max_turns")]
    pub max_turns: u32,
    /// Global lane concurrency cap.
    #[serde(default = "d_max_concurrent_runs")]
    pub max_concurrent_runs: usize,
    /// Estimated-token working budget for the message list (4 chars ≈ 1 token).
    #[serde(default = "d_token_budget")]
    pub token_budget: usize,
    /// Name of the global lane.
    #[serde(default = "d_main_lane")]
    pub main_lane: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_turns: d_max_turns(),
            max_concurrent_runs: d_max_concurrent_runs(),
            token_budget: d_token_budget(),
            main_lane: d_main_lane(),
        }
    }
}

fn d_max_turns() -> u32 {
    25
}
fn d_max_concurrent_runs() -> usize {
    2
}
fn d_token_budget() -> usize {
    120_000
}
fn d_main_lane() -> String {
    "main".into()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tools
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Glob patterns of tool names to allow.  Empty = all allowed.
    #[serde(default)]
    pub allow: Vec<String>,
    /// Glob patterns of tool names to deny.  Deny wins over allow.
    #[serde(default)]
    pub deny: Vec<String>,
    /// When false, file-writing tools are not registered.
    #[serde(default = "d_true")]
    pub allow_write: bool,
    /// When false, the exec tool is not registered.
    #[serde(default = "d_true")]
    pub allow_exec: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            allow: Vec::new(),
            deny: Vec::new(),
            allow_write: true,
            allow_exec: true,
        }
    }
}

fn d_true() -> bool {
    true
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Heartbeat
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Interval between self-initiated runs.
    #[serde(default = "d_interval_ms")]
    pub interval_ms: u64,
    /// Wake requests inside this window collapse into one execution.
    #[serde(default = "d_coalesce_ms")]
    pub coalesce_ms: u64,
    /// Window for trimmed-equal duplicate output suppression.
    #[serde(default = "d_duplicate_window_ms")]
    pub duplicate_window_ms: u64,
    /// Markdown task file, relative to the workspace root.
    #[serde(default = "d_task_file")]
    pub task_file: String,
    /// When set, heartbeat runs are gated to this local-time window.
    #[serde(default)]
    pub active_hours: Option<ActiveHours>,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_ms: d_interval_ms(),
            coalesce_ms: d_coalesce_ms(),
            duplicate_window_ms: d_duplicate_window_ms(),
            task_file: d_task_file(),
            active_hours: None,
        }
    }
}

fn d_interval_ms() -> u64 {
    30 * 60 * 1000
}
fn d_coalesce_ms() -> u64 {
    250
}
fn d_duplicate_window_ms() -> u64 {
    24 * 60 * 60 * 1000
}
fn d_task_file() -> String {
    "HEARTBEAT.md".into()
}

/// An `[start, end)` local-time window.  `end <= start` wraps past
/// midnight (e.g. 22:00–06:00).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveHours {
    /// "HH:MM"
    pub start: String,
    /// "HH:MM"
    pub end: String,
    /// IANA timezone name; defaults to the system local timezone.
    #[serde(default)]
    pub timezone: Option<String>,
}

impl ActiveHours {
    /// Parse both bounds into minutes-of-day.
    pub fn parsed(&self) -> crate::error::Result<(u32, u32)> {
        Ok((parse_hhmm(&self.start)?, parse_hhmm(&self.end)?))
    }

    /// Whether `minutes_of_day` falls inside the window.
    pub fn contains(&self, minutes_of_day: u32) -> bool {
        let Ok((start, end)) = self.parsed() else {
            return true;
        };
        if end <= start {
            // Wraps midnight: active before end OR from start onward.
            minutes_of_day >= start || minutes_of_day < end
        } else {
            minutes_of_day >= start && minutes_of_day < end
        }
    }
}

fn parse_hhmm(s: &str) -> crate::error::Result<u32> {
    let err = || crate::error::Error::Config(format!("invalid HH:MM time: {s:?}"));
    let (h, m) = s.split_once(':').ok_or_else(err)?;
    let h: u32 = h.trim().parse().map_err(|_| err())?;
    let m: u32 = m.trim().parse().map_err(|_| err())?;
    if h > 23 || m > 59 {
        return Err(err());
    }
    Ok(h * 60 + m)
}
