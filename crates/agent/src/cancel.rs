//! Per-run cancellation handles.
//!
//! The orchestrator registers a token for every live run; `abort` signals
//! one or all of them.  Adapted from per-session cancel maps: here runs
//! are the unit of cancellation because steering (not cancellation) is
//! the per-session control surface.

use std::collections::HashMap;

use parking_lot::Mutex;
use uuid::Uuid;

use ma_domain::CancelToken;

/// Tracks live run cancellation tokens.
#[derive(Default)]
pub struct CancelMap {
    tokens: Mutex<HashMap<Uuid, CancelToken>>,
}

impl CancelMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a token for a run.
    pub fn register(&self, run_id: Uuid) -> CancelToken {
        let token = CancelToken::new();
        self.tokens.lock().insert(run_id, token.clone());
        token
    }

    /// Cancel one run.  Returns whether a live token was found.
    pub fn cancel(&self, run_id: Uuid) -> bool {
        match self.tokens.lock().get(&run_id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every live run, returning how many were signalled.
    pub fn cancel_all(&self) -> usize {
        let tokens = self.tokens.lock();
        for token in tokens.values() {
            token.cancel();
        }
        tokens.len()
    }

    /// Drop the token when a run completes.
    pub fn remove(&self, run_id: Uuid) {
        self.tokens.lock().remove(&run_id);
    }

    /// Number of live runs.
    pub fn live_count(&self) -> usize {
        self.tokens.lock().len()
    }
}
