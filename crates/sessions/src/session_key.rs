//! Canonical session keys.
//!
//! Key template: `agent:<agentId>:<tail>`.  The agent id is normalized to
//! `[a-z0-9][a-z0-9_-]{0,63}`; subagent sessions use the tail
//! `subagent:<uuid>`.  Every path that accepts either a bare session id or
//! a full key must produce an identical canonical key, so resolution is
//! idempotent under re-application.

/// Fallback id when normalization consumes the whole input.
const FALLBACK_AGENT_ID: &str = "agent";

/// Tail used when no session id is given.
const DEFAULT_TAIL: &str = "main";

/// Normalize a raw agent id to `[a-z0-9][a-z0-9_-]{0,63}`.
///
/// Lowercases, replaces non-matching characters with hyphens, trims
/// characters that cannot lead or trail, and truncates to 64.
pub fn normalize_agent_id(raw: &str) -> String {
    let mut id: String = raw
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect();

    // First char must be alphanumeric; strip leading separators.
    while id.starts_with(['-', '_']) {
        id.remove(0);
    }
    while id.ends_with('-') {
        id.pop();
    }
    id.truncate(64);

    if id.is_empty() {
        FALLBACK_AGENT_ID.to_string()
    } else {
        id
    }
}

/// Compute the canonical session key for an agent id and a session
/// identifier.  `session` may be a bare id or an existing full key.
pub fn resolve_session_key(agent_id: &str, session: &str) -> String {
    let session = session.trim();

    // Already a full key: re-canonicalize its components.
    if let Some(rest) = session.strip_prefix("agent:") {
        if let Some((id, tail)) = rest.split_once(':') {
            let tail = tail.trim();
            let tail = if tail.is_empty() { DEFAULT_TAIL } else { tail };
            return format!("agent:{}:{}", normalize_agent_id(id), tail);
        }
        // Malformed "agent:" prefix without a tail; treat the remainder
        // as a bare session id.
        return format!("agent:{}:{}", normalize_agent_id(agent_id), rest);
    }

    let tail = if session.is_empty() {
        DEFAULT_TAIL
    } else {
        session
    };
    format!("agent:{}:{}", normalize_agent_id(agent_id), tail)
}

/// Derive a fresh subagent session key for the given agent.
pub fn subagent_session_key(agent_id: &str) -> String {
    format!(
        "agent:{}:subagent:{}",
        normalize_agent_id(agent_id),
        uuid::Uuid::new_v4()
    )
}

/// Whether a canonical key names a subagent session.
pub fn is_subagent_key(session_key: &str) -> bool {
    session_key
        .strip_prefix("agent:")
        .and_then(|rest| rest.split_once(':'))
        .map(|(_, tail)| tail.starts_with("subagent:"))
        .unwrap_or(false)
}
