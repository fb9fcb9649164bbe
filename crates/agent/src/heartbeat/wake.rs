//! Wake coalescer.
//!
//! `request()` records a wake request and schedules execution through a
//! single-shot timer.  Requests arriving within the coalescing window
//! collapse into one execution; a request arriving while the handler is
//! running guarantees exactly one follow-up execution.  Reasons merge by
//! priority so a burst keeps its most urgent cause.

use std::sync::Arc;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;

/// Why a wake was requested, in ascending priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WakeReason {
    Requested,
    Retry,
    Interval,
    Cron,
    Exec,
}

impl WakeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            WakeReason::Requested => "requested",
            WakeReason::Retry => "retry",
            WakeReason::Interval => "interval",
            WakeReason::Cron => "cron",
            WakeReason::Exec => "exec",
        }
    }
}

impl std::fmt::Display for WakeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A snapshot handed to the handler when the timer fires.
#[derive(Debug, Clone)]
pub struct WakeRequest {
    pub reason: WakeReason,
    pub source: Option<String>,
}

/// Handler outcome.  A skip with reason `requests-in-flight` triggers a
/// retry wake one second later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Ran,
    Skipped { reason: String },
}

pub type WakeHandler = Arc<dyn Fn(WakeRequest) -> BoxFuture<'static, RunStatus> + Send + Sync>;

const RETRY_DELAY_MS: u64 = 1_000;

struct WakeState {
    running: bool,
    scheduled: bool,
    timer: Option<tokio::task::JoinHandle<()>>,
    pending_reason: Option<WakeReason>,
    pending_source: Option<String>,
}

struct WakeInner {
    coalesce_ms: u64,
    handler: WakeHandler,
    state: Mutex<WakeState>,
}

/// The coalescer.  Clones share state.
#[derive(Clone)]
pub struct HeartbeatWake {
    inner: Arc<WakeInner>,
}

impl HeartbeatWake {
    pub fn new(coalesce_ms: u64, handler: WakeHandler) -> Self {
        Self {
            inner: Arc::new(WakeInner {
                coalesce_ms,
                handler,
                state: Mutex::new(WakeState {
                    running: false,
                    scheduled: false,
                    timer: None,
                    pending_reason: None,
                    pending_source: None,
                }),
            }),
        }
    }

    /// Record a wake request and schedule execution.
    pub fn request(&self, reason: WakeReason, source: Option<&str>) {
        let coalesce_ms = self.inner.coalesce_ms;
        {
            let mut st = self.inner.state.lock();
            merge_pending(&mut st, reason, source);

            if st.running {
                st.scheduled = true;
                return;
            }
            if st.timer.is_some() {
                // Coalesced into the armed timer.
                return;
            }
            arm_locked(&self.inner, &mut st, coalesce_ms);
        }
    }

    /// Clear any armed timer and reset the double-buffer flag.  Pending
    /// reason/source survive for a later `request`.
    pub fn stop(&self) {
        let mut st = self.inner.state.lock();
        if let Some(timer) = st.timer.take() {
            timer.abort();
        }
        st.scheduled = false;
    }

    /// Whether an execution is currently in flight.
    pub fn is_running(&self) -> bool {
        self.inner.state.lock().running
    }
}

fn merge_pending(st: &mut WakeState, reason: WakeReason, source: Option<&str>) {
    let takes_precedence = match st.pending_reason {
        Some(current) => reason > current,
        None => true,
    };
    if takes_precedence {
        st.pending_reason = Some(reason);
        if source.is_some() {
            st.pending_source = source.map(str::to_string);
        }
    } else if st.pending_source.is_none() {
        st.pending_source = source.map(str::to_string);
    }
}

/// Arm the single-shot timer.  Called with the state lock held so the
/// spawned task (whose first action is taking the lock) cannot observe a
/// half-armed state.
fn arm_locked(inner: &Arc<WakeInner>, st: &mut WakeState, delay_ms: u64) {
    let inner = inner.clone();
    st.timer = Some(tokio::spawn(async move {
        if delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
        }
        fire(inner).await;
    }));
}

async fn fire(inner: Arc<WakeInner>) {
    let request = {
        let mut st = inner.state.lock();
        st.timer = None;
        st.running = true;
        WakeRequest {
            reason: st.pending_reason.take().unwrap_or(WakeReason::Requested),
            source: st.pending_source.take(),
        }
    };

    tracing::debug!(reason = %request.reason, "heartbeat wake firing");
    let status = (inner.handler)(request).await;

    let mut st = inner.state.lock();
    st.running = false;

    if st.scheduled {
        // A request arrived during execution: exactly one follow-up.
        st.scheduled = false;
        arm_locked(&inner, &mut st, 0);
    } else if matches!(&status, RunStatus::Skipped { reason } if reason == "requests-in-flight") {
        merge_pending(&mut st, WakeReason::Retry, None);
        arm_locked(&inner, &mut st, RETRY_DELAY_MS);
    }
}
