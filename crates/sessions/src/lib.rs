//! Session identity and persistence: canonical session keys and the
//! append-only JSONL session log.

pub mod log;
pub mod session_key;

pub use log::{LogEntry, SessionLog};
pub use session_key::{
    is_subagent_key, normalize_agent_id, resolve_session_key, subagent_session_key,
};
