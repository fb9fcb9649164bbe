//! Per-session steering queues.
//!
//! A steering message is user input injected while a run is executing
//! tools.  The queue is owned by the session key, not the run, so
//! messages survive across runs until drained by the agent loop between
//! tool executions.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;

#[derive(Default)]
pub struct SteeringQueues {
    queues: Mutex<HashMap<String, VecDeque<String>>>,
}

impl SteeringQueues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, session_key: &str, text: impl Into<String>) {
        self.queues
            .lock()
            .entry(session_key.to_string())
            .or_default()
            .push_back(text.into());
    }

    pub fn has_pending(&self, session_key: &str) -> bool {
        self.queues
            .lock()
            .get(session_key)
            .map(|q| !q.is_empty())
            .unwrap_or(false)
    }

    /// Drain all pending messages in arrival order.
    pub fn drain(&self, session_key: &str) -> Vec<String> {
        let mut queues = self.queues.lock();
        match queues.get_mut(session_key) {
            Some(queue) => queue.drain(..).collect(),
            None => Vec::new(),
        }
    }
}
