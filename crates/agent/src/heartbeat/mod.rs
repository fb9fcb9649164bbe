//! The heartbeat subsystem: self-initiated invocations.
//!
//! [`wake::HeartbeatWake`] coalesces wake requests and guarantees at most
//! one in-flight execution; [`runner::HeartbeatRunner`] owns the periodic
//! schedule, the active-hours gate, the task file, and duplicate-output
//! suppression.  All runs flow through the coalescer.

pub mod runner;
pub mod tasks;
pub mod wake;

pub use runner::{HeartbeatRunner, RunnerConfig};
pub use tasks::{mark_task_completed, parse_tasks, HeartbeatTask};
pub use wake::{HeartbeatWake, RunStatus, WakeReason, WakeRequest};
