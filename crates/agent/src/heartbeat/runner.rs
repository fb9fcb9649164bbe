//! Heartbeat runner.
//!
//! Owns the periodic schedule (single-shot timers recomputed from
//! `last_run_at` so drift never accumulates), the active-hours gate, the
//! task-file parse, handler dispatch, and duplicate-output suppression.
//! The scheduling timer only issues a wake request; every run flows
//! through the coalescer.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock, Weak};

use futures_util::future::BoxFuture;
use parking_lot::{Mutex, RwLock};

use ma_domain::config::{ActiveHours, HeartbeatConfig};
use ma_domain::error::Result;

use super::tasks::{parse_tasks, HeartbeatTask};
use super::wake::{HeartbeatWake, RunStatus, WakeReason, WakeRequest};

/// Runner tuning, resolved against a workspace.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub interval_ms: u64,
    pub coalesce_ms: u64,
    pub duplicate_window_ms: u64,
    pub task_file: PathBuf,
    pub active_hours: Option<ActiveHours>,
}

impl RunnerConfig {
    pub fn from_heartbeat(cfg: &HeartbeatConfig, workspace: &Path) -> Self {
        Self {
            interval_ms: cfg.interval_ms,
            coalesce_ms: cfg.coalesce_ms,
            duplicate_window_ms: cfg.duplicate_window_ms,
            task_file: workspace.join(&cfg.task_file),
            active_hours: cfg.active_hours.clone(),
        }
    }
}

/// Handles one heartbeat dispatch; may return response text.
pub type TaskHandler =
    Arc<dyn Fn(Vec<HeartbeatTask>, WakeRequest) -> BoxFuture<'static, Result<Option<String>>> + Send + Sync>;

/// Receives deduplicated response text.
pub type OutputSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Reports whether user requests are in flight (heartbeat yields to them).
pub type BusyCheck = Arc<dyn Fn() -> bool + Send + Sync>;

struct RunnerState {
    last_run_at: Option<i64>,
    next_due_ms: Option<i64>,
    timer: Option<tokio::task::JoinHandle<()>>,
    last_text: Option<String>,
    last_text_at: Option<i64>,
}

struct RunnerInner {
    config: RunnerConfig,
    wake: OnceLock<HeartbeatWake>,
    handlers: RwLock<Vec<TaskHandler>>,
    sinks: RwLock<Vec<OutputSink>>,
    busy_check: RwLock<Option<BusyCheck>>,
    state: Mutex<RunnerState>,
}

/// The heartbeat scheduler.  Clones share state.
#[derive(Clone)]
pub struct HeartbeatRunner {
    inner: Arc<RunnerInner>,
}

impl HeartbeatRunner {
    pub fn new(config: RunnerConfig) -> Self {
        let coalesce_ms = config.coalesce_ms;
        let inner = Arc::new(RunnerInner {
            config,
            wake: OnceLock::new(),
            handlers: RwLock::new(Vec::new()),
            sinks: RwLock::new(Vec::new()),
            busy_check: RwLock::new(None),
            state: Mutex::new(RunnerState {
                last_run_at: None,
                next_due_ms: None,
                timer: None,
                last_text: None,
                last_text_at: None,
            }),
        });

        // The wake handler holds a weak reference so a dropped runner
        // does not keep itself alive through its own timers.
        let weak: Weak<RunnerInner> = Arc::downgrade(&inner);
        let wake = HeartbeatWake::new(
            coalesce_ms,
            Arc::new(move |req| {
                let weak = weak.clone();
                Box::pin(async move {
                    match weak.upgrade() {
                        Some(inner) => RunnerInner::run_once(inner, req).await,
                        None => RunStatus::Skipped {
                            reason: "stopped".into(),
                        },
                    }
                })
            }),
        );
        inner.wake.set(wake).ok();

        Self { inner }
    }

    /// Register a dispatch handler.
    pub fn on_tasks(&self, handler: TaskHandler) {
        self.inner.handlers.write().push(handler);
    }

    /// Register an output sink for deduplicated response text.
    pub fn on_output(&self, sink: OutputSink) {
        self.inner.sinks.write().push(sink);
    }

    /// Install the in-flight-requests probe.
    pub fn set_busy_check(&self, check: BusyCheck) {
        *self.inner.busy_check.write() = Some(check);
    }

    /// Arm the first timer: due at `last_run_at + interval`, or now on
    /// the first start.
    pub fn start(&self) {
        let now = now_ms();
        let due = {
            let st = self.inner.state.lock();
            st.last_run_at
                .map(|t| t + self.inner.config.interval_ms as i64)
                .unwrap_or(now)
        };
        RunnerInner::schedule_at(&self.inner, due);
    }

    /// Request an immediate wake (e.g. an explicit `exec`).
    pub fn request_now(&self, reason: WakeReason, source: Option<&str>) {
        if let Some(wake) = self.inner.wake.get() {
            wake.request(reason, source);
        }
    }

    pub fn stop(&self) {
        {
            let mut st = self.inner.state.lock();
            if let Some(timer) = st.timer.take() {
                timer.abort();
            }
        }
        if let Some(wake) = self.inner.wake.get() {
            wake.stop();
        }
    }

    pub fn last_run_at(&self) -> Option<i64> {
        self.inner.state.lock().last_run_at
    }

    pub fn next_due_ms(&self) -> Option<i64> {
        self.inner.state.lock().next_due_ms
    }
}

impl RunnerInner {
    /// Arm the single-shot scheduling timer.  It only issues a wake
    /// request, so execution always flows through the coalescer.
    fn schedule_at(inner: &Arc<RunnerInner>, due_ms: i64) {
        let delay = (due_ms - now_ms()).max(0) as u64;
        let weak = Arc::downgrade(inner);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
            if let Some(inner) = weak.upgrade() {
                if let Some(wake) = inner.wake.get() {
                    wake.request(WakeReason::Interval, Some("timer"));
                }
            }
        });

        let mut st = inner.state.lock();
        if let Some(old) = st.timer.take() {
            old.abort();
        }
        st.timer = Some(handle);
        st.next_due_ms = Some(due_ms);
    }

    async fn run_once(inner: Arc<RunnerInner>, req: WakeRequest) -> RunStatus {
        let now = now_ms();

        // Yield to in-flight user requests; the wake retries in 1 s.
        if let Some(busy) = inner.busy_check.read().clone() {
            if busy() {
                return RunStatus::Skipped {
                    reason: "requests-in-flight".into(),
                };
            }
        }

        // 1. Active-hours gate.  `last_run_at` stays untouched; the
        //    timer is rearmed a full interval out so the heartbeat
        //    revives once the window opens.
        if let Some(hours) = &inner.config.active_hours {
            let minutes = local_minutes_of_day(hours.timezone.as_deref());
            if !hours.contains(minutes) {
                tracing::debug!(minutes, "heartbeat outside active hours");
                Self::schedule_at(&inner, now + inner.config.interval_ms as i64);
                return RunStatus::Skipped {
                    reason: "outside-active-hours".into(),
                };
            }
        }

        // 2. Parse tasks.  A missing file means no tasks.
        let content = std::fs::read_to_string(&inner.config.task_file).unwrap_or_default();
        let pending: Vec<HeartbeatTask> = parse_tasks(&content)
            .into_iter()
            .filter(|t| !t.completed)
            .collect();

        // 3. Empty-pending skip (an explicit exec always dispatches).
        if pending.is_empty() && req.reason != WakeReason::Exec {
            Self::commit(&inner, now, None);
            return RunStatus::Skipped {
                reason: "no-pending-tasks".into(),
            };
        }

        // 4. Dispatch.
        let handlers: Vec<TaskHandler> = inner.handlers.read().clone();
        let mut text: Option<String> = None;
        for handler in handlers {
            match handler(pending.clone(), req.clone()).await {
                Ok(Some(t)) if !t.trim().is_empty() => text = Some(t),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "heartbeat handler failed"),
            }
        }

        // 5. Duplicate suppression: trimmed-equal output inside the
        //    window is not forwarded (and lastText is not refreshed).
        if let Some(t) = &text {
            let suppressed = {
                let st = inner.state.lock();
                match (&st.last_text, st.last_text_at) {
                    (Some(last), Some(at)) => {
                        last.trim() == t.trim()
                            && now - at < inner.config.duplicate_window_ms as i64
                    }
                    _ => false,
                }
            };
            if suppressed {
                tracing::info!("duplicate heartbeat output suppressed");
                Self::commit(&inner, now, None);
                return RunStatus::Ran;
            }
        }

        // 6. Forward and commit.
        if let Some(t) = &text {
            let sinks: Vec<OutputSink> = inner.sinks.read().clone();
            for sink in sinks {
                sink(t);
            }
        }
        Self::commit(&inner, now, text);
        RunStatus::Ran
    }

    /// Update run state and rearm the timer from `last_run_at`.
    fn commit(inner: &Arc<RunnerInner>, now: i64, text: Option<String>) {
        {
            let mut st = inner.state.lock();
            st.last_run_at = Some(now);
            if let Some(t) = text {
                st.last_text = Some(t);
                st.last_text_at = Some(now);
            }
        }
        Self::schedule_at(inner, now + inner.config.interval_ms as i64);
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Minutes-of-day in the configured timezone (system local by default).
fn local_minutes_of_day(timezone: Option<&str>) -> u32 {
    use chrono::Timelike;

    if let Some(name) = timezone {
        if let Ok(tz) = name.parse::<chrono_tz::Tz>() {
            let now = chrono::Utc::now().with_timezone(&tz);
            return now.hour() * 60 + now.minute();
        }
        tracing::warn!(timezone = name, "unknown timezone, falling back to local");
    }
    let now = chrono::Local::now();
    now.hour() * 60 + now.minute()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn config(tmp: &Path, interval_ms: u64) -> RunnerConfig {
        RunnerConfig {
            interval_ms,
            coalesce_ms: 10,
            duplicate_window_ms: 24 * 60 * 60 * 1000,
            task_file: tmp.join("HEARTBEAT.md"),
            active_hours: None,
        }
    }

    fn counting_handler(counter: Arc<AtomicUsize>, reply: Option<&str>) -> TaskHandler {
        let reply = reply.map(str::to_string);
        Arc::new(move |_tasks, _req| {
            let reply = reply.clone();
            counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move { Ok(reply) })
        })
    }

    /// An active-hours window that certainly excludes the current time.
    fn closed_hours_now() -> ActiveHours {
        let now = chrono::Utc::now();
        let start = (now.hour() + 2) % 24;
        let end = (now.hour() + 3) % 24;
        ActiveHours {
            start: format!("{start:02}:00"),
            end: format!("{end:02}:00"),
            timezone: Some("UTC".into()),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn dispatches_pending_tasks() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("HEARTBEAT.md"), "- [ ] water plants\n").unwrap();

        let runner = HeartbeatRunner::new(config(tmp.path(), 60_000));
        let dispatched = Arc::new(AtomicUsize::new(0));
        runner.on_tasks(counting_handler(dispatched.clone(), Some("done")));

        let outputs = Arc::new(Mutex::new(Vec::new()));
        let sink_outputs = outputs.clone();
        runner.on_output(Arc::new(move |t| sink_outputs.lock().push(t.to_string())));

        runner.request_now(WakeReason::Exec, Some("test"));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(dispatched.load(Ordering::SeqCst), 1);
        assert_eq!(*outputs.lock(), vec!["done"]);
        assert!(runner.last_run_at().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_pending_skips_unless_exec() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("HEARTBEAT.md"), "- [x] all done\n").unwrap();

        let runner = HeartbeatRunner::new(config(tmp.path(), 60_000));
        let dispatched = Arc::new(AtomicUsize::new(0));
        runner.on_tasks(counting_handler(dispatched.clone(), None));

        runner.request_now(WakeReason::Interval, None);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(dispatched.load(Ordering::SeqCst), 0, "interval wake skips");
        assert!(runner.last_run_at().is_some(), "lastRunAt still commits");

        runner.request_now(WakeReason::Exec, None);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(dispatched.load(Ordering::SeqCst), 1, "exec always dispatches");
    }

    #[tokio::test(start_paused = true)]
    async fn active_hours_gate_skips_without_commit() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("HEARTBEAT.md"), "- [ ] pending\n").unwrap();

        let mut cfg = config(tmp.path(), 60_000);
        cfg.active_hours = Some(closed_hours_now());

        let runner = HeartbeatRunner::new(cfg);
        let dispatched = Arc::new(AtomicUsize::new(0));
        runner.on_tasks(counting_handler(dispatched.clone(), Some("out")));

        // A burst of requests coalesces into one (skipped) invocation.
        runner.request_now(WakeReason::Requested, None);
        runner.request_now(WakeReason::Requested, None);
        runner.request_now(WakeReason::Requested, None);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(dispatched.load(Ordering::SeqCst), 0);
        assert!(runner.last_run_at().is_none(), "lastRunAt unchanged");
        assert!(runner.next_due_ms().is_some(), "timer rearmed");
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_output_suppressed_within_window() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("HEARTBEAT.md"), "- [ ] pending\n").unwrap();

        let runner = HeartbeatRunner::new(config(tmp.path(), 3600_000));
        let dispatched = Arc::new(AtomicUsize::new(0));
        runner.on_tasks(counting_handler(dispatched.clone(), Some("same text ")));

        let outputs = Arc::new(Mutex::new(Vec::new()));
        let sink_outputs = outputs.clone();
        runner.on_output(Arc::new(move |t| sink_outputs.lock().push(t.to_string())));

        runner.request_now(WakeReason::Exec, None);
        tokio::time::sleep(Duration::from_millis(100)).await;
        runner.request_now(WakeReason::Exec, None);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(dispatched.load(Ordering::SeqCst), 2);
        // Trimmed-equal output forwarded exactly once.
        assert_eq!(outputs.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn interval_timer_issues_wake() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("HEARTBEAT.md"), "- [ ] pending\n").unwrap();

        let runner = HeartbeatRunner::new(config(tmp.path(), 500));
        let dispatched = Arc::new(AtomicUsize::new(0));
        runner.on_tasks(counting_handler(dispatched.clone(), None));

        runner.start();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(dispatched.load(Ordering::SeqCst), 1, "first run is immediate");

        // Next run rearms from last_run_at + interval.
        tokio::time::sleep(Duration::from_millis(700)).await;
        assert_eq!(dispatched.load(Ordering::SeqCst), 2);

        runner.stop();
        tokio::time::sleep(Duration::from_millis(2000)).await;
        assert_eq!(dispatched.load(Ordering::SeqCst), 2, "stopped");
    }

    #[tokio::test(start_paused = true)]
    async fn busy_check_defers_with_retry() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("HEARTBEAT.md"), "- [ ] pending\n").unwrap();

        let runner = HeartbeatRunner::new(config(tmp.path(), 3600_000));
        let dispatched = Arc::new(AtomicUsize::new(0));
        runner.on_tasks(counting_handler(dispatched.clone(), None));

        let busy = Arc::new(std::sync::atomic::AtomicBool::new(true));
        let busy_probe = busy.clone();
        runner.set_busy_check(Arc::new(move || busy_probe.load(Ordering::SeqCst)));

        runner.request_now(WakeReason::Interval, None);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(dispatched.load(Ordering::SeqCst), 0, "deferred while busy");

        busy.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert_eq!(dispatched.load(Ordering::SeqCst), 1, "retried after 1s");
    }
}
