//! Process-wide event bus with per-run monotonic sequence numbers.
//!
//! Every emission carries the run id, a `seq` starting at 1 and strictly
//! increasing per run, a millisecond timestamp, the stream name, and an
//! opaque data map.  Subscriber panics are swallowed.  When a lifecycle
//! event with phase `end` or `error` is emitted, the run's sequence
//! counter is released.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStream {
    Lifecycle,
    Assistant,
    Tool,
    Subagent,
    Error,
}

/// One emission on the bus.
#[derive(Debug, Clone, Serialize)]
pub struct AgentEvent {
    pub run_id: Uuid,
    pub seq: u64,
    /// Millisecond timestamp.
    pub ts: i64,
    pub stream: EventStream,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    pub data: Value,
}

type Callback = Arc<dyn Fn(&AgentEvent) + Send + Sync>;
type SubscriberMap = Arc<Mutex<HashMap<u64, Callback>>>;

/// Publish-subscribe sink for runtime events.
#[derive(Default)]
pub struct EventBus {
    subscribers: SubscriberMap,
    next_subscriber: AtomicU64,
    seqs: Mutex<HashMap<Uuid, u64>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a subscriber; the returned disposer detaches it when
    /// dropped (or explicitly via [`Subscription::close`]).
    pub fn subscribe(&self, callback: impl Fn(&AgentEvent) + Send + Sync + 'static) -> Subscription {
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().insert(id, Arc::new(callback));
        Subscription {
            subscribers: self.subscribers.clone(),
            id,
        }
    }

    /// Emit an event, assigning the run's next sequence number.
    pub fn emit(
        &self,
        run_id: Uuid,
        stream: EventStream,
        session_key: Option<&str>,
        agent_id: Option<&str>,
        data: Value,
    ) -> u64 {
        let seq = {
            let mut seqs = self.seqs.lock();
            let counter = seqs.entry(run_id).or_insert(0);
            *counter += 1;
            *counter
        };

        let release = stream == EventStream::Lifecycle
            && matches!(
                data.get("phase").and_then(|v| v.as_str()),
                Some("end") | Some("error")
            );

        let event = AgentEvent {
            run_id,
            seq,
            ts: chrono::Utc::now().timestamp_millis(),
            stream,
            session_key: session_key.map(str::to_string),
            agent_id: agent_id.map(str::to_string),
            data,
        };

        let callbacks: Vec<Callback> = self.subscribers.lock().values().cloned().collect();
        for callback in callbacks {
            // Subscriber exceptions must never disturb the runtime.
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                callback(&event)
            }));
            if result.is_err() {
                tracing::warn!(run_id = %run_id, "event subscriber panicked");
            }
        }

        if release {
            self.seqs.lock().remove(&run_id);
        }

        seq
    }

    /// Number of runs with a live sequence counter.
    pub fn live_runs(&self) -> usize {
        self.seqs.lock().len()
    }
}

/// Disposer returned by [`EventBus::subscribe`].
pub struct Subscription {
    subscribers: SubscriberMap,
    id: u64,
}

impl Subscription {
    /// Detach explicitly.
    pub fn close(self) {
        // Drop does the work.
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.subscribers.lock().remove(&self.id);
    }
}
