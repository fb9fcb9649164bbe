//! The composed runtime state.
//!
//! `AgentState` replaces the source system's process-global singletons
//! with one cloneable bundle of Arc'd services: every map that would be a
//! global (lanes, event counters, cancellation handles, steering queues)
//! lives here behind its own lock.

use std::path::PathBuf;
use std::sync::Arc;

use ma_domain::config::{AgentConfig, TOKEN_BUDGET_SOFT_FLOOR};
use ma_domain::error::Result;
use ma_memory::MemoryStore;
use ma_providers::LlmProvider;
use ma_sessions::{normalize_agent_id, SessionLog};
use ma_skills::SkillSet;
use ma_tools::builtin::{ExecTool, ReadFileTool, WriteFileTool};
use ma_tools::{ToolPolicy, ToolRegistry};

use crate::cancel::CancelMap;
use crate::events::EventBus;
use crate::lanes::LaneScheduler;
use crate::steering::SteeringQueues;
use crate::tools::{CompleteTaskTool, SaveMemoryTool};

const DEFAULT_SYSTEM_PROMPT: &str = "You are mini-agent, a capable assistant operating inside \
the user's workspace. Use the available tools to inspect and change files, run commands, and \
complete the user's request. Be direct and keep replies concise.";

/// Cloneable bundle of runtime services.
#[derive(Clone)]
pub struct AgentState {
    // See `impl std::fmt::Debug` below: field list intentionally abbreviated
    // since several fields (e.g. `Arc<dyn LlmProvider>`) don't implement Debug.
    pub config: Arc<AgentConfig>,
    /// Normalized agent id (the session-key prefix).
    pub agent_id: String,
    pub workspace: PathBuf,
    /// User home, consulted for the managed config/skills/context tier.
    pub home: Option<PathBuf>,
    pub provider: Arc<dyn LlmProvider>,
    /// Provider used for compaction summaries (defaults to `provider`).
    pub summarizer: Arc<dyn LlmProvider>,
    pub tools: Arc<ToolRegistry>,
    pub policy: Arc<ToolPolicy>,
    pub log: Arc<SessionLog>,
    pub skills: Arc<SkillSet>,
    pub memory: Arc<MemoryStore>,
    pub lanes: LaneScheduler,
    pub events: Arc<EventBus>,
    pub cancels: Arc<CancelMap>,
    pub steering: Arc<SteeringQueues>,
    pub system_prompt_base: Arc<String>,
}

impl std::fmt::Debug for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentState")
            .field("agent_id", &self.agent_id)
            .field("workspace", &self.workspace)
            .field("home", &self.home)
            .finish_non_exhaustive()
    }
}

impl AgentState {
    /// Build the runtime for a workspace, consulting the user's home
    /// directory for the managed tier.
    pub fn new(
        config: AgentConfig,
        workspace: impl Into<PathBuf>,
        provider: Arc<dyn LlmProvider>,
    ) -> Result<Self> {
        Self::with_home(config, workspace, provider, dirs::home_dir())
    }

    /// Build the runtime with an explicit (or absent) home directory.
    /// Tests use this to keep discovery hermetic.
    pub fn with_home(
        config: AgentConfig,
        workspace: impl Into<PathBuf>,
        provider: Arc<dyn LlmProvider>,
        home: Option<PathBuf>,
    ) -> Result<Self> {
        config.validate()?;
        if config.run.token_budget < TOKEN_BUDGET_SOFT_FLOOR {
            tracing::warn!(
                token_budget = config.run.token_budget,
                soft_floor = TOKEN_BUDGET_SOFT_FLOOR,
                "token budget below the soft floor; expect aggressive pruning"
            );
        }

        let workspace = workspace.into();
        let agent_id = normalize_agent_id(&config.agent_id);

        let managed_skills = home
            .as_ref()
            .map(|h| h.join(".mini-agent").join("skills"))
            .unwrap_or_else(|| PathBuf::from("/nonexistent"));
        let skills = SkillSet::load(&managed_skills, &workspace.join("skills"));

        let memory = Arc::new(MemoryStore::open(
            workspace.join(".mini-agent").join("memory").join("index.json"),
        )?);
        let log = SessionLog::new(workspace.join(".mini-agent").join("sessions"));

        let mut tools = ToolRegistry::new();
        tools.register(Arc::new(ReadFileTool));
        if config.tools.allow_write {
            tools.register(Arc::new(WriteFileTool));
        }
        if config.tools.allow_exec {
            tools.register(Arc::new(ExecTool));
        }
        tools.register(Arc::new(SaveMemoryTool::new(memory.clone())));
        tools.register(Arc::new(CompleteTaskTool::new(
            workspace.join(&config.heartbeat.task_file),
        )));
        let policy = ToolPolicy::new(&config.tools.allow, &config.tools.deny);

        tracing::info!(
            agent_id = %agent_id,
            workspace = %workspace.display(),
            skills = skills.entries().len(),
            tools = tools.len(),
            "agent state ready"
        );

        Ok(Self {
            config: Arc::new(config),
            agent_id,
            workspace,
            home,
            summarizer: provider.clone(),
            provider,
            tools: Arc::new(tools),
            policy: Arc::new(policy),
            log: Arc::new(log),
            skills: Arc::new(skills),
            memory,
            lanes: LaneScheduler::new(),
            events: Arc::new(EventBus::new()),
            cancels: Arc::new(CancelMap::new()),
            steering: Arc::new(SteeringQueues::new()),
            system_prompt_base: Arc::new(DEFAULT_SYSTEM_PROMPT.to_string()),
        })
    }

    /// Override the base system prompt fragment.
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt_base = Arc::new(prompt.into());
        self
    }

    /// Override the summarizer provider.
    pub fn with_summarizer(mut self, summarizer: Arc<dyn LlmProvider>) -> Self {
        self.summarizer = summarizer;
        self
    }
}
