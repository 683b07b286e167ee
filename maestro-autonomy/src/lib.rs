//! MAESTRO Autonomy - The Decision Loop
//!
//! Wraps an arbitrary analysis agent in a decision cycle that gates,
//! executes, learns from, and remembers the outcome of autonomous actions:
//!
//! ```text
//! ANALYZE -> DECIDE -> GENERATE_ACTIONS -> GATE -> {EXECUTE | QUEUE}
//!                                                       |
//!                              PERSIST <- LEARN <- REFLECT
//! ```
//!
//! Every candidate action is either auto-executed or routed to the approval
//! queue with a recorded reason - never both. A failure at any stage is
//! caught at the cycle boundary, recorded in the report's error list, and
//! still feeds a failure-weighted policy update; the cycle never throws past
//! `run_cycle`.

mod approval;
mod executor;
mod runner;

pub use approval::{ApprovalQueue, ApprovalQueueEntry};
pub use executor::{ExecutorRegistry, NoOpExecutor};
pub use runner::{
    AutonomousRunner, AutonomyConfig, CycleInvoker, CycleReport, CycleRequest, ExecutedAction,
    QueuedAction,
};
