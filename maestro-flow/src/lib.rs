//! MAESTRO Flow - Workflow Orchestration
//!
//! Executes a registered DAG of named steps against the injected agent
//! invoker, respecting dependencies, per-step timeouts, and retry budgets.
//!
//! Per-step state machine: pending -> running -> {completed | failed}, with
//! failures retried up to the step's budget (linear backoff) before they
//! become terminal. A definition is either sequential (declaration order,
//! each step's result visible to later steps) or parallel (all
//! dependency-satisfied steps dispatched concurrently each tick). A cycle or
//! unsatisfiable dependency halts the run with a "no runnable steps" error
//! instead of deadlocking.

mod definition;
mod orchestrator;

pub use definition::{
    StepOutcome, StepStatus, WorkflowDefinition, WorkflowExecution, WorkflowStatus, WorkflowStep,
};
pub use orchestrator::{OrchestratorConfig, WorkflowOrchestrator};
