//! Context pruning and compaction.
//!
//! Token estimation is coarse: 4 characters ≈ 1 token over the string
//! forms of all content.  Pruning drops oldest messages first while
//! preserving the tool_use/tool_result pairing -- a tool_result never
//! survives without its matching tool_use.  When pruning drops anything,
//! compaction can summarize the dropped prefix into a synthetic user
//! message prepended to the retained tail.

use std::collections::HashSet;

use ma_domain::error::{Error, Result};
use ma_domain::{ContentBlock, Message, MessageContent};
use ma_providers::{ChatRequest, LlmProvider};

pub const CHARS_PER_TOKEN: usize = 4;

/// Ceiling on the summarizer's own output.
const SUMMARY_MAX_TOKENS: u32 = 2000;

/// Fixed instruction for the compaction summarizer.
pub const COMPACT_SYSTEM_PROMPT: &str = "You are a conversation summarizer. Produce a compact \
summary of the conversation you are given. Preserve: the current goal, key decisions, open \
questions, important facts about the user, and any in-progress tool state. Write in present \
tense, omit pleasantries, and keep it short.";

/// Marker line prepended to injected summaries.
const SUMMARY_PREFIX: &str = "[conversation summary]";

/// Estimated token count of a single message.
pub fn estimate_message_tokens(message: &Message) -> usize {
    message.content.char_len().div_ceil(CHARS_PER_TOKEN)
}

/// Estimated token count of a message list.
pub fn estimate_tokens(messages: &[Message]) -> usize {
    messages.iter().map(estimate_message_tokens).sum()
}

/// Result of a prune pass.
#[derive(Debug)]
pub struct PruneOutcome {
    pub kept: Vec<Message>,
    pub dropped: Vec<Message>,
}

/// Drop oldest messages until the estimate fits `budget_tokens`.
///
/// After the prefix drop, tool_result blocks whose matching tool_use was
/// dropped are removed as well; a message left with no blocks drops
/// entirely.  Under an impossibly small budget the kept list may be
/// empty.
pub fn prune_messages(messages: &[Message], budget_tokens: usize) -> PruneOutcome {
    let per_message: Vec<usize> = messages.iter().map(estimate_message_tokens).collect();
    let mut total: usize = per_message.iter().sum();

    let mut cut = 0;
    while total > budget_tokens && cut < messages.len() {
        total -= per_message[cut];
        cut += 1;
    }

    let mut dropped: Vec<Message> = messages[..cut].to_vec();
    let retained = &messages[cut..];

    // Sweep orphaned tool_results: their partner tool_use was dropped.
    let live_use_ids: HashSet<&str> = retained
        .iter()
        .flat_map(|m| m.tool_use_ids())
        .collect();

    let mut kept = Vec::with_capacity(retained.len());
    for message in retained {
        match &message.content {
            MessageContent::Blocks(blocks)
                if blocks
                    .iter()
                    .any(|b| matches!(b, ContentBlock::ToolResult { .. })) =>
            {
                let surviving: Vec<ContentBlock> = blocks
                    .iter()
                    .filter(|b| match b {
                        ContentBlock::ToolResult { tool_use_id, .. } => {
                            live_use_ids.contains(tool_use_id.as_str())
                        }
                        _ => true,
                    })
                    .cloned()
                    .collect();

                if surviving.is_empty() {
                    dropped.push(message.clone());
                } else if surviving.len() == blocks.len() {
                    kept.push(message.clone());
                } else {
                    let mut pruned = message.clone();
                    pruned.content = MessageContent::Blocks(surviving);
                    kept.push(pruned);
                }
            }
            _ => kept.push(message.clone()),
        }
    }

    PruneOutcome { kept, dropped }
}

/// Result of a compaction pass.
#[derive(Debug)]
pub struct CompactOutcome {
    pub messages: Vec<Message>,
    pub summary: Option<String>,
}

/// Prune to `budget_tokens` and summarize the dropped prefix.
///
/// When nothing is dropped the input passes through unchanged.  The
/// summary becomes a synthetic user message at the head of the retained
/// tail.
pub async fn compact_messages(
    summarizer: &dyn LlmProvider,
    messages: &[Message],
    budget_tokens: usize,
) -> Result<CompactOutcome> {
    let PruneOutcome { kept, dropped } = prune_messages(messages, budget_tokens);
    if dropped.is_empty() {
        return Ok(CompactOutcome {
            messages: kept,
            summary: None,
        });
    }

    let conversation = build_conversation_text(&dropped);
    let req = ChatRequest {
        system: COMPACT_SYSTEM_PROMPT.to_string(),
        messages: vec![Message::user(conversation)],
        max_tokens: Some(SUMMARY_MAX_TOKENS),
        temperature: Some(0.1),
        ..Default::default()
    };

    let summary = summarizer.chat(req).await?.content.trim().to_string();
    if summary.is_empty() {
        return Err(Error::ContextOverflow(
            "compaction produced an empty summary".into(),
        ));
    }

    tracing::info!(
        dropped = dropped.len(),
        kept = kept.len(),
        summary_len = summary.len(),
        "history compacted"
    );

    let mut result = Vec::with_capacity(kept.len() + 1);
    result.push(Message::user(format!("{SUMMARY_PREFIX}\n{summary}")));
    result.extend(kept);

    Ok(CompactOutcome {
        messages: result,
        summary: Some(summary),
    })
}

fn build_conversation_text(messages: &[Message]) -> String {
    let mut buf = String::new();
    for message in messages {
        let label = match message.role {
            ma_domain::Role::User => "User",
            ma_domain::Role::Assistant => "Assistant",
        };
        buf.push_str(label);
        buf.push_str(": ");

        let text = render_for_summary(message);
        // Truncate very long entries (tool results) so the summarizer
        // prompt stays manageable.
        if text.len() > 2000 {
            let head_end = floor_char_boundary(&text, 1000);
            let tail_start = ceil_char_boundary(&text, text.len() - 500);
            buf.push_str(&text[..head_end]);
            buf.push_str(" [...] ");
            buf.push_str(&text[tail_start..]);
        } else {
            buf.push_str(&text);
        }
        buf.push('\n');
    }
    buf
}

fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_char_boundary(s: &str, mut idx: usize) -> usize {
    while idx < s.len() && !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

fn render_for_summary(message: &Message) -> String {
    match &message.content {
        MessageContent::Text(t) => t.clone(),
        MessageContent::Blocks(blocks) => blocks
            .iter()
            .map(|b| match b {
                ContentBlock::Text { text } => text.clone(),
                ContentBlock::ToolUse { name, input, .. } => {
                    format!("[tool call: {name} {input}]")
                }
                ContentBlock::ToolResult {
                    tool_name, content, ..
                } => format!("[{tool_name} result: {content}]"),
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}
