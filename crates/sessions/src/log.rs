//! Append-only JSONL session logs.
//!
//! Each session key maps to `<dir>/<sessionKey>.jsonl` with one
//! JSON-encoded message per line.  Entries carry a stable uuid and are
//! never rewritten; `clear` removes the whole file.  Writers are
//! serialized per session by the session lane, so appends need no
//! file-level locking.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use ma_domain::error::{Error, Result};
use ma_domain::Message;

/// A single log entry: a stable id plus the message itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    #[serde(flatten)]
    pub message: Message,
}

/// Append-only message log, one JSONL file per session key.
pub struct SessionLog {
    dir: PathBuf,
}

impl SessionLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, session_key: &str) -> PathBuf {
        // Session keys contain ':' which is fine on unix; path separators
        // are not.
        let safe: String = session_key
            .chars()
            .map(|c| if c == '/' || c == '\\' { '_' } else { c })
            .collect();
        self.dir.join(format!("{safe}.jsonl"))
    }

    /// Append a message, returning the entry with its minted id.
    pub fn append(&self, session_key: &str, message: &Message) -> Result<LogEntry> {
        std::fs::create_dir_all(&self.dir).map_err(Error::Io)?;

        let entry = LogEntry {
            id: uuid::Uuid::new_v4().to_string(),
            message: message.clone(),
        };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        use std::io::Write;
        let path = self.path_for(session_key);
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(Error::Io)?;
        file.write_all(line.as_bytes()).map_err(Error::Io)?;

        tracing::debug!(session_key, entry_id = %entry.id, "session log append");
        Ok(entry)
    }

    /// Load all entries for a session.  Malformed lines are skipped with
    /// a warning rather than failing the load.
    pub fn load(&self, session_key: &str) -> Result<Vec<LogEntry>> {
        let path = self.path_for(session_key);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let raw = std::fs::read_to_string(&path).map_err(Error::Io)?;
        let mut entries = Vec::new();
        for line in raw.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<LogEntry>(line) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    tracing::warn!(session_key, error = %e, "skipping malformed log line");
                }
            }
        }
        Ok(entries)
    }

    /// Load just the messages for a session.
    pub fn load_messages(&self, session_key: &str) -> Result<Vec<Message>> {
        Ok(self.load(session_key)?.into_iter().map(|e| e.message).collect())
    }

    /// Remove a session's log file.
    pub fn clear(&self, session_key: &str) -> Result<()> {
        let path = self.path_for(session_key);
        if path.exists() {
            std::fs::remove_file(&path).map_err(Error::Io)?;
        }
        Ok(())
    }

    /// List session keys that have a log file.
    pub fn list(&self) -> Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        for entry in std::fs::read_dir(&self.dir).map_err(Error::Io)? {
            let path = entry.map_err(Error::Io)?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                keys.push(stem.to_string());
            }
        }
        keys.sort();
        Ok(keys)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}
