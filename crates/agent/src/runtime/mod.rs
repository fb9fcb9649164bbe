//! The orchestrator: session routing, lane discipline, run lifecycle,
//! steering, abort, subagents, and heartbeat wiring.
//!
//! Every invocation enqueues on its session lane (cap 1) whose callback
//! enqueues on the global lane (configurable cap), serializing work per
//! session while bounding process-wide parallelism.

pub mod turn;

use std::sync::Arc;

use uuid::Uuid;

use ma_domain::error::{Error, Result};
use ma_domain::Message;
use ma_sessions::{is_subagent_key, resolve_session_key, subagent_session_key};
use ma_skills::{render_skills_prompt, resolve_command, rewrite_input};

use crate::compact::{compact_messages, estimate_tokens};
use crate::context::load_context_files;
use crate::events::EventStream;
use crate::heartbeat::{HeartbeatRunner, HeartbeatTask, RunnerConfig, WakeRequest};
use crate::state::AgentState;

pub use turn::{run_agent_loop, LoopInput, LoopOutcome};

/// Session tail used for self-initiated runs.
const HEARTBEAT_SESSION: &str = "heartbeat";

/// Ceiling on the subagent summary reflected into the parent session.
const SUBAGENT_SUMMARY_CHARS: usize = 600;

/// Memory hits injected into the system prompt.
const MEMORY_HITS: usize = 5;

/// What a completed run reports to the caller.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub session_key: String,
    pub text: String,
    pub turns: u32,
    pub tool_calls: u32,
}

/// Execute one user (or heartbeat) invocation on a session.
///
/// `session` may be a bare id or a full session key; both resolve to the
/// same canonical key.
pub async fn run(state: &AgentState, session: &str, user_text: &str) -> Result<RunOutcome> {
    let session_key = resolve_session_key(&state.config.agent_id, session);
    let session_lane = format!("session:{session_key}");
    let main_lane = state.config.run.main_lane.clone();
    let max_runs = state.config.run.max_concurrent_runs;

    let lanes = state.lanes.clone();
    let admitted_state = state.clone();
    let admitted_key = session_key.clone();
    let text = user_text.to_string();

    // Session lane serializes the session; its callback competes on the
    // global lane for process-wide capacity.
    let nested = {
        let lanes = lanes.clone();
        async move {
            lanes
                .enqueue(&main_lane, max_runs, async move {
                    run_admitted(admitted_state, admitted_key, text).await
                })
                .await
        }
    };

    lanes.enqueue(&session_lane, 1, nested).await??
}

/// The admitted portion of a run: lifecycle events, cancellation handle,
/// and the agent loop.
async fn run_admitted(
    state: AgentState,
    session_key: String,
    user_text: String,
) -> Result<RunOutcome> {
    let run_id = Uuid::new_v4();
    let cancel = state.cancels.register(run_id);

    state.events.emit(
        run_id,
        EventStream::Lifecycle,
        Some(&session_key),
        Some(&state.agent_id),
        serde_json::json!({"phase": "start"}),
    );

    let result = run_inner(&state, run_id, &session_key, &user_text, cancel).await;
    state.cancels.remove(run_id);

    match &result {
        Ok(outcome) => {
            state.events.emit(
                run_id,
                EventStream::Lifecycle,
                Some(&session_key),
                Some(&state.agent_id),
                serde_json::json!({
                    "phase": "end",
                    "turns": outcome.turns,
                    "tool_calls": outcome.tool_calls,
                }),
            );
        }
        Err(e) => {
            state.events.emit(
                run_id,
                EventStream::Lifecycle,
                Some(&session_key),
                Some(&state.agent_id),
                serde_json::json!({"phase": "error", "error": e.to_string()}),
            );
        }
    }

    result
}

async fn run_inner(
    state: &AgentState,
    run_id: Uuid,
    session_key: &str,
    user_text: &str,
    cancel: ma_domain::CancelToken,
) -> Result<RunOutcome> {
    // Load history and append the (possibly rewritten) user message.
    let mut messages = state.log.load_messages(session_key)?;

    let input_text = match resolve_command(state.skills.commands(), user_text) {
        Some(invocation) => {
            tracing::debug!(skill = %invocation.skill_name, "slash command matched");
            rewrite_input(&invocation.skill_name, &invocation.args)
        }
        None => user_text.to_string(),
    };

    let user_msg = Message::user(input_text);
    state.log.append(session_key, &user_msg)?;
    messages.push(user_msg);

    // Whole-history compaction when the estimate exceeds the budget.
    let budget = state.config.run.token_budget;
    if estimate_tokens(&messages) > budget {
        state.events.emit(
            run_id,
            EventStream::Lifecycle,
            Some(session_key),
            Some(&state.agent_id),
            serde_json::json!({"phase": "compact", "trigger": "budget"}),
        );
        messages = compact_messages(state.summarizer.as_ref(), &messages, budget)
            .await?
            .messages;
    }

    let system_prompt = build_system_prompt(state, user_text);

    let outcome = run_agent_loop(
        state,
        LoopInput {
            run_id,
            session_key: session_key.to_string(),
            system_prompt,
            messages,
            cancel,
        },
    )
    .await?;

    Ok(RunOutcome {
        run_id,
        session_key: session_key.to_string(),
        text: outcome.text,
        turns: outcome.turns,
        tool_calls: outcome.tool_calls,
    })
}

/// Compose the system prompt: base fragment, context files, the skills
/// fragment, and relevant memories for this input.
fn build_system_prompt(state: &AgentState, user_text: &str) -> String {
    let mut sections = vec![state.system_prompt_base.as_str().to_string()];

    let context = load_context_files(state.home.as_deref(), &state.workspace);
    if !context.is_empty() {
        sections.push(format!("# Context\n\n{context}"));
    }

    if let Some(skills) = render_skills_prompt(state.skills.entries()) {
        sections.push(skills);
    }

    let hits = state.memory.search(user_text, MEMORY_HITS);
    if !hits.is_empty() {
        let lines: Vec<String> = hits
            .iter()
            .map(|h| format!("- {}", h.entry.content))
            .collect();
        sections.push(format!("# Relevant memories\n\n{}", lines.join("\n")));
    }

    sections.join("\n\n")
}

/// Inject a steering message into a session.  The agent loop drains the
/// queue between tool executions.
pub fn steer(state: &AgentState, session: &str, text: &str) {
    let session_key = resolve_session_key(&state.config.agent_id, session);
    state.steering.push(&session_key, text);
}

/// Abort one run, or every live run when `run_id` is `None`.  Returns
/// how many runs were signalled.
pub fn abort(state: &AgentState, run_id: Option<Uuid>) -> usize {
    match run_id {
        Some(id) => state.cancels.cancel(id) as usize,
        None => state.cancels.cancel_all(),
    }
}

/// Spawn a child run on a derived session key.  The child executes with
/// full lane discipline; its summary is reflected into the parent's log
/// asynchronously.  Subagents cannot spawn subagents.
pub fn spawn_subagent(
    state: &AgentState,
    parent_session: &str,
    task: &str,
    parent_run_id: Option<Uuid>,
) -> Result<String> {
    let parent_key = resolve_session_key(&state.config.agent_id, parent_session);
    if is_subagent_key(&parent_key) {
        return Err(Error::Config(
            "subagents cannot spawn subagents".into(),
        ));
    }

    let child_key = subagent_session_key(&state.config.agent_id);
    if let Some(run_id) = parent_run_id {
        state.events.emit(
            run_id,
            EventStream::Subagent,
            Some(&parent_key),
            Some(&state.agent_id),
            serde_json::json!({"phase": "spawned", "child_session_key": child_key}),
        );
    }

    let spawn_state = state.clone();
    let spawned_child = child_key.clone();
    let task = task.to_string();

    // Fire-and-forget: the parent is never blocked on the child.
    tokio::spawn(async move {
        let result = run(&spawn_state, &spawned_child, &task).await;
        let summary = match &result {
            Ok(outcome) => outcome.text.clone(),
            Err(e) => format!("error: {e}"),
        };
        let summary = truncate_chars(&summary, SUBAGENT_SUMMARY_CHARS);
        let message = Message::user(format!("[subagent summary]\n{summary}"));

        // Parent log writes keep session-lane discipline.
        let log = spawn_state.log.clone();
        let parent = parent_key.clone();
        let append = spawn_state
            .lanes
            .enqueue(&format!("session:{parent}"), 1, async move {
                log.append(&parent, &message).map(|_| ())
            })
            .await
            .and_then(|r| r);
        if let Err(e) = append {
            tracing::warn!(error = %e, "failed to record subagent summary");
        }

        if let (Some(run_id), Ok(outcome)) = (parent_run_id, &result) {
            spawn_state.events.emit(
                run_id,
                EventStream::Subagent,
                Some(&parent_key),
                Some(&spawn_state.agent_id),
                serde_json::json!({
                    "phase": "completed",
                    "child_session_key": spawned_child,
                    "turns": outcome.turns,
                }),
            );
        }
    });

    Ok(child_key)
}

/// Wire and start the heartbeat for this state, when enabled.
pub fn start_heartbeat(state: &AgentState) -> Option<HeartbeatRunner> {
    if !state.config.heartbeat.enabled {
        return None;
    }

    let runner = HeartbeatRunner::new(RunnerConfig::from_heartbeat(
        &state.config.heartbeat,
        &state.workspace,
    ));

    // Heartbeats yield to live user runs; the wake retries in one second.
    let cancels = state.cancels.clone();
    runner.set_busy_check(Arc::new(move || cancels.live_count() > 0));

    let run_state = state.clone();
    runner.on_tasks(Arc::new(move |tasks, req| {
        let state = run_state.clone();
        Box::pin(async move {
            let prompt = heartbeat_prompt(&tasks, &req);
            let outcome = run(&state, HEARTBEAT_SESSION, &prompt).await?;
            let text = outcome.text.trim().to_string();
            Ok((!text.is_empty()).then_some(text))
        })
    }));

    runner.start();
    tracing::info!(
        interval_ms = state.config.heartbeat.interval_ms,
        "heartbeat started"
    );
    Some(runner)
}

/// Decorate the heartbeat invocation with a task preamble.
fn heartbeat_prompt(tasks: &[HeartbeatTask], req: &WakeRequest) -> String {
    let mut prompt = format!("[heartbeat wake: {}]\n", req.reason);
    if let Some(source) = &req.source {
        prompt.push_str(&format!("source: {source}\n"));
    }
    prompt.push_str("\nPending tasks:\n");
    for task in tasks {
        prompt.push_str(&format!("- (line {}) {}\n", task.line, task.description));
    }
    prompt.push_str(
        "\nWork on these tasks now. When one is finished, call the complete_task tool with its \
         line number. Reply with a short status, or nothing if there is nothing to report.",
    );
    prompt
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}
