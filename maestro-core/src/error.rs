//! Error types for MAESTRO operations.
//!
//! Validation errors are rejected immediately and never retried. Transient
//! execution failures are retried inside the component that owns them and
//! surface here only once their retry budget is exhausted. Policy denials
//! (budget, safety, confidence) are routed outcomes, not errors, and have no
//! variants in this taxonomy.

use crate::ActionType;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Event bus errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BusError {
    #[error("Dispatch queue closed, bus is shut down")]
    QueueClosed,

    #[error("Subscriber {subscriber_id} callback failed: {reason}")]
    CallbackFailed {
        subscriber_id: String,
        reason: String,
    },

    #[error("No subscription found for subscriber {subscriber_id}")]
    SubscriptionNotFound { subscriber_id: String },
}

/// Scheduler errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ScheduleError {
    #[error("Invalid frequency spec: {reason}")]
    InvalidFrequency { reason: String },

    #[error("Scheduled task not found: {task_id}")]
    TaskNotFound { task_id: Uuid },
}

/// Trigger engine errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TriggerError {
    #[error("Trigger rule already registered: {rule_id}")]
    DuplicateRule { rule_id: String },

    #[error("Trigger rule not found: {rule_id}")]
    RuleNotFound { rule_id: String },

    #[error("Invalid trigger rule {rule_id}: {reason}")]
    InvalidRule { rule_id: String, reason: String },
}

/// Policy engine errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PolicyError {
    #[error("No candidate actions for context {context}")]
    NoCandidates { context: String },
}

/// Workflow orchestration errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum WorkflowError {
    #[error("Workflow not found: {workflow_id}")]
    NotFound { workflow_id: String },

    #[error("Invalid workflow {workflow_id}: {reason}")]
    Validation { workflow_id: String, reason: String },

    #[error("No runnable steps in execution {execution_id}, pending: {pending:?}")]
    NoRunnableSteps {
        execution_id: Uuid,
        pending: Vec<String>,
    },

    #[error("Step {step_id} timed out after {timeout:?}")]
    StepTimeout { step_id: String, timeout: Duration },

    #[error("Step {step_id} failed: {reason}")]
    StepFailed { step_id: String, reason: String },
}

/// Action execution errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ActionError {
    #[error("No executor registered for action type {action_type}")]
    ExecutorMissing { action_type: ActionType },

    #[error("Executor already registered for action type {action_type}")]
    ExecutorAlreadyRegistered { action_type: ActionType },

    #[error("Agent {agent_id} invocation failed: {reason}")]
    InvocationFailed { agent_id: String, reason: String },

    #[error("Approval entry not found: {entry_id}")]
    ApprovalNotFound { entry_id: Uuid },

    #[error("Approval entry {entry_id} already resolved")]
    ApprovalAlreadyResolved { entry_id: Uuid },
}

/// Master error type for all MAESTRO errors.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MaestroError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    #[error("Trigger error: {0}")]
    Trigger(#[from] TriggerError),

    #[error("Policy error: {0}")]
    Policy(#[from] PolicyError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Action error: {0}")]
    Action(#[from] ActionError),
}

/// Result type alias for MAESTRO operations.
pub type MaestroResult<T> = Result<T, MaestroError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_error_display() {
        let err = ScheduleError::InvalidFrequency {
            reason: "weekly with empty weekday set".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Invalid frequency"));
        assert!(msg.contains("empty weekday set"));
    }

    #[test]
    fn test_workflow_error_display_no_runnable() {
        let err = WorkflowError::NoRunnableSteps {
            execution_id: Uuid::nil(),
            pending: vec!["b".to_string(), "c".to_string()],
        };
        let msg = format!("{}", err);
        assert!(msg.contains("No runnable steps"));
        assert!(msg.contains("\"b\""));
    }

    #[test]
    fn test_action_error_display() {
        let err = ActionError::ExecutorMissing {
            action_type: ActionType::PublishContent,
        };
        assert!(format!("{}", err).contains("publish_content"));
    }

    #[test]
    fn test_maestro_error_from_variants() {
        let bus = MaestroError::from(BusError::QueueClosed);
        assert!(matches!(bus, MaestroError::Bus(_)));

        let schedule = MaestroError::from(ScheduleError::TaskNotFound {
            task_id: Uuid::nil(),
        });
        assert!(matches!(schedule, MaestroError::Schedule(_)));

        let trigger = MaestroError::from(TriggerError::RuleNotFound {
            rule_id: "anomaly-to-analyst".to_string(),
        });
        assert!(matches!(trigger, MaestroError::Trigger(_)));

        let workflow = MaestroError::from(WorkflowError::NotFound {
            workflow_id: "weekly-report".to_string(),
        });
        assert!(matches!(workflow, MaestroError::Workflow(_)));
    }
}
