//! Workflow definitions, steps, and execution records.

use maestro_core::{EntityId, Timestamp, WorkflowError};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;

// ============================================================================
// STEPS
// ============================================================================

/// Lifecycle of one step within an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl StepStatus {
    /// Whether the step has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Failed)
    }
}

/// One node in a workflow DAG.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStep {
    /// Identifier unique within the definition
    pub step_id: String,
    /// Agent the step invokes
    pub agent_id: String,
    /// Step-specific input template
    #[serde(default)]
    pub input: serde_json::Value,
    /// Step ids that must reach a terminal successful (or
    /// continue-on-failure) state before this step starts
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Wall-clock bound on one invocation attempt
    #[serde(with = "duration_millis")]
    pub timeout: Duration,
    /// Transient-failure retry budget
    pub max_retries: u32,
    /// A failure of this step does not block its dependents
    #[serde(default)]
    pub continue_on_failure: bool,
}

impl WorkflowStep {
    /// Create a step with the default timeout and retry budget.
    pub fn new(step_id: impl Into<String>, agent_id: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            agent_id: agent_id.into(),
            input: serde_json::Value::Null,
            depends_on: Vec::new(),
            timeout: Duration::from_secs(30),
            max_retries: 1,
            continue_on_failure: false,
        }
    }

    /// Set the step input template.
    pub fn with_input(mut self, input: serde_json::Value) -> Self {
        self.input = input;
        self
    }

    /// Add dependencies.
    pub fn depends_on(mut self, deps: &[&str]) -> Self {
        self.depends_on = deps.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Set the per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the retry budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Let dependents run even if this step fails.
    pub fn continue_on_failure(mut self) -> Self {
        self.continue_on_failure = true;
        self
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

// ============================================================================
// DEFINITIONS
// ============================================================================

/// A named DAG of steps. Registered once and read-only during execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub workflow_id: String,
    pub steps: Vec<WorkflowStep>,
    /// Dispatch dependency-satisfied steps concurrently instead of walking
    /// the declaration order
    #[serde(default)]
    pub parallel: bool,
    /// Mark the execution failed on the first failed step instead of
    /// completing with partial failures
    #[serde(default)]
    pub stop_on_first_failure: bool,
}

impl WorkflowDefinition {
    pub fn new(workflow_id: impl Into<String>, steps: Vec<WorkflowStep>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            steps,
            parallel: false,
            stop_on_first_failure: false,
        }
    }

    /// Dispatch dependency-satisfied steps concurrently.
    pub fn parallel(mut self) -> Self {
        self.parallel = true;
        self
    }

    /// Fail the whole execution on the first failed step.
    pub fn stop_on_first_failure(mut self) -> Self {
        self.stop_on_first_failure = true;
        self
    }

    /// Structural validation applied at registration time: empty
    /// definitions, duplicate step ids, and dependencies on unknown or
    /// self step ids are rejected.
    pub fn validate(&self) -> Result<(), WorkflowError> {
        if self.workflow_id.is_empty() {
            return Err(WorkflowError::Validation {
                workflow_id: "<empty>".to_string(),
                reason: "workflow id must not be empty".to_string(),
            });
        }
        if self.steps.is_empty() {
            return Err(WorkflowError::Validation {
                workflow_id: self.workflow_id.clone(),
                reason: "workflow has no steps".to_string(),
            });
        }

        let mut ids = HashSet::new();
        for step in &self.steps {
            if !ids.insert(step.step_id.as_str()) {
                return Err(WorkflowError::Validation {
                    workflow_id: self.workflow_id.clone(),
                    reason: format!("duplicate step id {}", step.step_id),
                });
            }
        }
        for step in &self.steps {
            for dep in &step.depends_on {
                if dep == &step.step_id {
                    return Err(WorkflowError::Validation {
                        workflow_id: self.workflow_id.clone(),
                        reason: format!("step {} depends on itself", step.step_id),
                    });
                }
                if !ids.contains(dep.as_str()) {
                    return Err(WorkflowError::Validation {
                        workflow_id: self.workflow_id.clone(),
                        reason: format!("step {} depends on unknown step {}", step.step_id, dep),
                    });
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// EXECUTIONS
// ============================================================================

/// Overall status of one workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Running,
    Completed,
    Failed,
}

/// Terminal record of one step within an execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct StepOutcome {
    pub status: StepStatus,
    /// Agent result data, for completed steps
    pub result: Option<serde_json::Value>,
    /// Invocation attempts consumed (1 = no retries)
    pub attempts: u32,
    pub error: Option<String>,
}

/// One run of a workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub execution_id: EntityId,
    pub workflow_id: String,
    pub input: serde_json::Value,
    pub step_results: HashMap<String, StepOutcome>,
    pub status: WorkflowStatus,
    pub errors: Vec<String>,
    pub started_at: Timestamp,
    pub completed_at: Option<Timestamp>,
}

impl WorkflowExecution {
    /// Step ids that never reached a terminal state (aborted runs).
    pub fn pending_steps(&self) -> Vec<&str> {
        self.step_results
            .iter()
            .filter(|(_, outcome)| !outcome.status.is_terminal())
            .map(|(id, _)| id.as_str())
            .collect()
    }

    /// Count of steps with the given status.
    pub fn count_with_status(&self, status: StepStatus) -> usize {
        self.step_results
            .values()
            .filter(|o| o.status == status)
            .count()
    }
}

// ============================================================================
// TESTS
// ============================================================================
