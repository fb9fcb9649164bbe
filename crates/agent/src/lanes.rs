//! Named FIFO lanes with per-lane concurrency caps.
//!
//! Two lanes compose the runtime's scheduling policy: every operation on
//! a session enqueues on `session:<key>` (cap 1), and the session-lane
//! callback enqueues on the global lane (configurable cap).  Admission is
//! strict FIFO within a lane; a lane admits the next task the instant
//! `active < max_concurrent`.  The active count is decremented on success
//! and failure alike.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use ma_domain::error::{Error, Result};

type Job = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

struct Lane {
    active: usize,
    max_concurrent: usize,
    queue: VecDeque<Job>,
}

/// Process-wide lane map.  Clones share the same lanes.
#[derive(Clone, Default)]
pub struct LaneScheduler {
    lanes: Arc<Mutex<HashMap<String, Lane>>>,
}

impl LaneScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue `fut` on `lane` and await its output.
    ///
    /// The lane is created on demand with `max_concurrent`; an existing
    /// lane keeps its current cap.  The returned future resolves once
    /// the task has been admitted and run to completion.
    pub fn enqueue<T, F>(
        &self,
        lane: &str,
        max_concurrent: usize,
        fut: F,
    ) -> impl Future<Output = Result<T>>
    where
        T: Send + 'static,
        F: Future<Output = T> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel::<T>();
        let job: Job = Box::new(move || {
            Box::pin(async move {
                let out = fut.await;
                let _ = tx.send(out);
            })
        });

        {
            let mut lanes = self.lanes.lock();
            let state = lanes.entry(lane.to_string()).or_insert_with(|| Lane {
                active: 0,
                max_concurrent: max_concurrent.max(1),
                queue: VecDeque::new(),
            });
            state.queue.push_back(job);
        }
        self.pump(lane);

        async move {
            rx.await
                .map_err(|_| Error::Other("lane task dropped before completing".into()))
        }
    }

    /// Change a lane's concurrency cap, draining newly available
    /// capacity immediately.
    pub fn set_max_concurrent(&self, lane: &str, max_concurrent: usize) {
        {
            let mut lanes = self.lanes.lock();
            if let Some(state) = lanes.get_mut(lane) {
                state.max_concurrent = max_concurrent.max(1);
            }
        }
        self.pump(lane);
    }

    /// Delete a lane when it has neither queued nor active tasks.
    /// Returns whether the lane was removed.
    pub fn remove_if_idle(&self, lane: &str) -> bool {
        let mut lanes = self.lanes.lock();
        match lanes.get(lane) {
            Some(state) if state.active == 0 && state.queue.is_empty() => {
                lanes.remove(lane);
                true
            }
            _ => false,
        }
    }

    /// Currently executing task count for a lane.
    pub fn active(&self, lane: &str) -> usize {
        self.lanes.lock().get(lane).map(|l| l.active).unwrap_or(0)
    }

    /// Queued (not yet admitted) task count for a lane.
    pub fn queued(&self, lane: &str) -> usize {
        self.lanes.lock().get(lane).map(|l| l.queue.len()).unwrap_or(0)
    }

    /// Admit queued tasks while capacity allows.
    fn pump(&self, lane: &str) {
        loop {
            let job = {
                let mut lanes = self.lanes.lock();
                let Some(state) = lanes.get_mut(lane) else {
                    return;
                };
                if state.active >= state.max_concurrent {
                    return;
                }
                match state.queue.pop_front() {
                    Some(job) => {
                        state.active += 1;
                        job
                    }
                    None => return,
                }
            };

            let guard = ActiveGuard {
                scheduler: self.clone(),
                lane: lane.to_string(),
            };
            tokio::spawn(async move {
                // The guard decrements the active count and re-pumps even
                // if the job panics.
                let _guard = guard;
                job().await;
            });
        }
    }
}

struct ActiveGuard {
    scheduler: LaneScheduler,
    lane: String,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        {
            let mut lanes = self.scheduler.lanes.lock();
            if let Some(state) = lanes.get_mut(&self.lane) {
                state.active = state.active.saturating_sub(1);
            }
        }
        self.scheduler.pump(&self.lane);
    }
}
