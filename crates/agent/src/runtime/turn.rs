//! The agent loop: per-turn prune → stream → tool dispatch → steering
//! check.
//!
//! Each turn prunes the working list, streams one model response under
//! the run's cancellation token, appends the assistant message, executes
//! the returned tool calls sequentially, and checks the steering queue
//! between calls.  Rate-limited turns restart under retry; a
//! context-overflow failure triggers one compaction per run and re-enters
//! the turn.  Zero tool calls terminates the loop.

use uuid::Uuid;

use ma_domain::error::{Error, Result};
use ma_domain::stream::StreamEvent;
use ma_domain::{CancelToken, ContentBlock, Message, ToolCall};
use ma_providers::classify::{classify, error_is_context_overflow, ErrorKind};
use ma_providers::{retry_async, ChatRequest, RetryOptions};
use ma_tools::ToolContext;

use futures_util::StreamExt;

use crate::compact::{compact_messages, prune_messages};
use crate::events::EventStream;
use crate::state::AgentState;

/// Input to one run of the loop.  `messages` is the working list with
/// the (possibly rewritten) user message already appended.
pub struct LoopInput {
    pub run_id: Uuid,
    pub session_key: String,
    pub system_prompt: String,
    pub messages: Vec<Message>,
    pub cancel: CancelToken,
}

/// What a finished loop reports.
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    /// Final assistant text (last turn's text).
    pub text: String,
    pub turns: u32,
    pub tool_calls: u32,
}

struct TurnData {
    text: String,
    calls: Vec<ToolCall>,
}

pub async fn run_agent_loop(state: &AgentState, input: LoopInput) -> Result<LoopOutcome> {
    let LoopInput {
        run_id,
        session_key,
        system_prompt,
        mut messages,
        cancel,
    } = input;

    let budget = state.config.run.token_budget;
    let mut turns = 0u32;
    let mut tool_calls_total = 0u32;
    let mut last_text = String::new();
    let mut compacted_this_run = false;

    while turns < state.config.run.max_turns {
        cancel.check()?;

        // 1. Prune against the token budget.
        let pruned = prune_messages(&messages, budget);
        if !pruned.dropped.is_empty() {
            tracing::debug!(
                dropped = pruned.dropped.len(),
                "pruned working messages before turn"
            );
        }
        messages = pruned.kept;

        // 2. Stream one model response (rate-limit retries inside;
        //    context overflow handled here with one compaction per run).
        let data = match stream_turn(state, run_id, &session_key, &system_prompt, &messages, &cancel)
            .await
        {
            Ok(data) => data,
            Err(e) if error_is_context_overflow(&e) && !compacted_this_run => {
                compacted_this_run = true;
                state.events.emit(
                    run_id,
                    EventStream::Lifecycle,
                    Some(&session_key),
                    Some(&state.agent_id),
                    serde_json::json!({"phase": "compact", "trigger": "context-overflow"}),
                );

                // Halve the target so the summary actually buys room.
                let outcome =
                    compact_messages(state.summarizer.as_ref(), &messages, budget / 2).await?;
                if outcome.summary.is_none() {
                    return Err(Error::ContextOverflow(e.to_string()));
                }
                messages = outcome.messages;
                // Rewind: re-enter this turn without counting it.
                continue;
            }
            Err(e) => return Err(e),
        };

        turns += 1;
        last_text = data.text.clone();

        // 3. Append the assistant message.
        let assistant_msg = if data.calls.is_empty() {
            Message::assistant(data.text.clone())
        } else {
            let mut blocks = Vec::new();
            if !data.text.is_empty() {
                blocks.push(ContentBlock::Text {
                    text: data.text.clone(),
                });
            }
            for call in &data.calls {
                blocks.push(ContentBlock::ToolUse {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    input: call.arguments.clone(),
                });
            }
            Message::assistant_blocks(blocks)
        };
        state.log.append(&session_key, &assistant_msg)?;
        messages.push(assistant_msg);

        // 4. Zero tool calls terminates the run.
        if data.calls.is_empty() {
            return Ok(LoopOutcome {
                text: data.text,
                turns,
                tool_calls: tool_calls_total,
            });
        }

        // 5. Execute tool calls sequentially, checking the steering
        //    queue between calls.
        let ctx = ToolContext::new(&state.workspace).with_cancel(cancel.clone());
        let mut result_blocks = Vec::new();
        let mut steered = false;
        let total_calls = data.calls.len();

        for (idx, call) in data.calls.iter().enumerate() {
            cancel.check()?;
            tool_calls_total += 1;

            state.events.emit(
                run_id,
                EventStream::Tool,
                Some(&session_key),
                Some(&state.agent_id),
                serde_json::json!({
                    "phase": "start",
                    "id": call.id,
                    "name": call.name,
                    "arguments": call.arguments,
                }),
            );

            let (content, is_error) = execute_tool(state, call, &ctx, &cancel).await?;

            state.events.emit(
                run_id,
                EventStream::Tool,
                Some(&session_key),
                Some(&state.agent_id),
                serde_json::json!({
                    "phase": "end",
                    "id": call.id,
                    "name": call.name,
                    "is_error": is_error,
                    "content": truncate_chars(&content, 400),
                }),
            );

            result_blocks.push(ContentBlock::ToolResult {
                tool_use_id: call.id.clone(),
                tool_name: call.name.clone(),
                content,
            });

            // Steering truncates the rest of the turn; unsent calls are
            // never retried -- the model sees the short result list and
            // re-plans.
            if idx + 1 < total_calls && state.steering.has_pending(&session_key) {
                steered = true;
                break;
            }
        }

        // 6. One user-role message carries all results of the turn.
        let results_msg = Message::tool_results(result_blocks);
        state.log.append(&session_key, &results_msg)?;
        messages.push(results_msg);

        // 7. Drain steering into a single user message.
        if steered {
            let texts = state.steering.drain(&session_key);
            if !texts.is_empty() {
                let steer_msg = Message::user(texts.join("\n"));
                state.log.append(&session_key, &steer_msg)?;
                messages.push(steer_msg);
            }
        }
    }

    tracing::warn!(
        session_key = %session_key,
        max_turns = state.config.run.max_turns,
        "agent loop hit the turn ceiling"
    );
    Ok(LoopOutcome {
        text: last_text,
        turns,
        tool_calls: tool_calls_total,
    })
}

/// Stream one assistant response with automatic rate-limit retry.
async fn stream_turn(
    state: &AgentState,
    run_id: Uuid,
    session_key: &str,
    system_prompt: &str,
    messages: &[Message],
    cancel: &CancelToken,
) -> Result<TurnData> {
    let opts = RetryOptions::default();
    retry_async(
        &opts,
        cancel,
        |err, _attempt| classify(err) == ErrorKind::RateLimit,
        |attempt, delay, err| {
            state.events.emit(
                run_id,
                EventStream::Error,
                Some(session_key),
                Some(&state.agent_id),
                serde_json::json!({
                    "kind": "rate_limit",
                    "attempt": attempt,
                    "retry_in_ms": delay.as_millis() as u64,
                    "error": err.to_string(),
                }),
            );
        },
        || stream_once(state, run_id, session_key, system_prompt, messages, cancel),
    )
    .await
}

/// Issue one streaming request and consume it to settle.
async fn stream_once(
    state: &AgentState,
    run_id: Uuid,
    session_key: &str,
    system_prompt: &str,
    messages: &[Message],
    cancel: &CancelToken,
) -> Result<TurnData> {
    cancel.check()?;

    let req = ChatRequest {
        system: system_prompt.to_string(),
        messages: messages.to_vec(),
        tools: state.tools.definitions(&state.policy),
        temperature: Some(state.config.model.temperature),
        max_tokens: Some(state.config.model.max_tokens),
        model: None,
        cancel: cancel.clone(),
    };

    let mut stream = state.provider.chat_stream(req).await?;

    let mut deltas = String::new();
    let mut text: Option<String> = None;
    let mut calls: Vec<ToolCall> = Vec::new();

    while let Some(event) = stream.next().await {
        cancel.check()?;
        match event? {
            StreamEvent::TextDelta { delta } => {
                state.events.emit(
                    run_id,
                    EventStream::Assistant,
                    Some(session_key),
                    Some(&state.agent_id),
                    serde_json::json!({"delta": delta}),
                );
                deltas.push_str(&delta);
            }
            StreamEvent::TextEnd { content } => text = Some(content),
            StreamEvent::ToolCallStart { .. } => {}
            StreamEvent::ToolCallEnd { tool_call } => calls.push(tool_call),
        }
    }

    // Stream exhaustion is the settle signal; text_end is authoritative
    // when present, accumulated deltas otherwise.
    Ok(TurnData {
        text: text.unwrap_or(deltas),
        calls,
    })
}

/// Run one tool call, coercing failures into user-visible result bodies.
/// Only cancellation aborts the run.
async fn execute_tool(
    state: &AgentState,
    call: &ToolCall,
    ctx: &ToolContext,
    cancel: &CancelToken,
) -> Result<(String, bool)> {
    let tool = state
        .tools
        .get(&call.name)
        .filter(|_| state.policy.is_allowed(&call.name));
    let Some(tool) = tool else {
        return Ok((format!("未知工具: {}", call.name), true));
    };

    match tool.execute(call.arguments.clone(), ctx).await {
        Ok(content) => Ok((content, false)),
        Err(e) if e.is_cancelled() || cancel.is_cancelled() => Err(Error::Cancelled),
        Err(e) => Ok((format!("执行错误: {e}"), true)),
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{cut}…")
    }
}
