//! The mini-agent runtime: lane scheduling, the event bus, context
//! pruning/compaction, the heartbeat pair, the agent loop, and the
//! orchestrator that composes them.

pub mod cancel;
pub mod cli;
pub mod compact;
pub mod context;
pub mod events;
pub mod heartbeat;
pub mod lanes;
pub mod runtime;
pub mod state;
pub mod steering;
pub mod tools;

pub use events::{AgentEvent, EventBus, EventStream};
pub use lanes::LaneScheduler;
pub use runtime::{abort, run, spawn_subagent, steer, RunOutcome};
pub use state::AgentState;
