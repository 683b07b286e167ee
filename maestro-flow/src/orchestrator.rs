//! Workflow execution engine.

use crate::{
    StepOutcome, StepStatus, WorkflowDefinition, WorkflowExecution, WorkflowStatus, WorkflowStep,
};
use chrono::Utc;
use maestro_core::{new_entity_id, AgentInvoker, EntityId, MaestroResult, WorkflowError};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::task::JoinSet;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Backoff between step retries is this duration times the attempt
    /// number (default: 250ms)
    pub backoff_base: Duration,
    /// Bounded execution history size (default: 100)
    pub history_cap: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            backoff_base: Duration::from_millis(250),
            history_cap: 100,
        }
    }
}

impl OrchestratorConfig {
    /// Configuration for tests with near-zero backoff.
    pub fn development() -> Self {
        Self {
            backoff_base: Duration::from_millis(5),
            history_cap: 100,
        }
    }
}

// ============================================================================
// ORCHESTRATOR
// ============================================================================

/// Executes registered workflow definitions against the agent invoker.
pub struct WorkflowOrchestrator {
    definitions: RwLock<HashMap<String, Arc<WorkflowDefinition>>>,
    invoker: Arc<dyn AgentInvoker>,
    history: Mutex<VecDeque<WorkflowExecution>>,
    config: OrchestratorConfig,
}

impl WorkflowOrchestrator {
    pub fn new(invoker: Arc<dyn AgentInvoker>, config: OrchestratorConfig) -> Self {
        Self {
            definitions: RwLock::new(HashMap::new()),
            invoker,
            history: Mutex::new(VecDeque::new()),
            config,
        }
    }

    /// Register a definition. Structural problems (duplicate step ids,
    /// unknown dependencies) are rejected here, before any execution.
    pub fn register(&self, definition: WorkflowDefinition) -> MaestroResult<()> {
        definition.validate()?;
        let mut definitions = self.definitions.write().expect("definition table poisoned");
        if definitions.contains_key(&definition.workflow_id) {
            return Err(WorkflowError::Validation {
                workflow_id: definition.workflow_id.clone(),
                reason: "workflow already registered".to_string(),
            }
            .into());
        }
        tracing::info!(
            workflow_id = %definition.workflow_id,
            steps = definition.steps.len(),
            parallel = definition.parallel,
            "Workflow registered"
        );
        definitions.insert(definition.workflow_id.clone(), Arc::new(definition));
        Ok(())
    }

    /// Registered workflow ids.
    pub fn list_workflows(&self) -> Vec<String> {
        self.definitions
            .read()
            .expect("definition table poisoned")
            .keys()
            .cloned()
            .collect()
    }

    /// Run a workflow to completion. Only an unknown workflow id is an
    /// `Err`; execution problems land in the returned record's `errors`.
    pub async fn execute_workflow(
        &self,
        workflow_id: &str,
        input: serde_json::Value,
    ) -> MaestroResult<WorkflowExecution> {
        let definition = self
            .definitions
            .read()
            .expect("definition table poisoned")
            .get(workflow_id)
            .cloned()
            .ok_or(WorkflowError::NotFound {
                workflow_id: workflow_id.to_string(),
            })?;

        let mut execution = WorkflowExecution {
            execution_id: new_entity_id(),
            workflow_id: workflow_id.to_string(),
            input,
            step_results: definition
                .steps
                .iter()
                .map(|s| (s.step_id.clone(), StepOutcome::default()))
                .collect(),
            status: WorkflowStatus::Running,
            errors: Vec::new(),
            started_at: Utc::now(),
            completed_at: None,
        };

        tracing::info!(
            workflow_id,
            execution_id = %execution.execution_id,
            parallel = definition.parallel,
            "Workflow execution started"
        );

        if definition.parallel {
            self.run_parallel(&definition, &mut execution).await;
        } else {
            self.run_sequential(&definition, &mut execution).await;
        }

        if execution.status == WorkflowStatus::Running {
            let any_failed = execution.count_with_status(StepStatus::Failed) > 0;
            execution.status = if any_failed && definition.stop_on_first_failure {
                WorkflowStatus::Failed
            } else {
                WorkflowStatus::Completed
            };
        }
        execution.completed_at = Some(Utc::now());

        tracing::info!(
            workflow_id,
            execution_id = %execution.execution_id,
            status = ?execution.status,
            completed = execution.count_with_status(StepStatus::Completed),
            failed = execution.count_with_status(StepStatus::Failed),
            "Workflow execution finished"
        );

        let mut history = self.history.lock().expect("execution history poisoned");
        history.push_back(execution.clone());
        while history.len() > self.config.history_cap {
            history.pop_front();
        }

        Ok(execution)
    }

    /// Look up a retained execution by id.
    pub fn get_execution(&self, execution_id: EntityId) -> Option<WorkflowExecution> {
        self.history
            .lock()
            .expect("execution history poisoned")
            .iter()
            .find(|e| e.execution_id == execution_id)
            .cloned()
    }

    /// Most recent executions, newest last, up to `limit`.
    pub fn recent_executions(&self, limit: usize) -> Vec<WorkflowExecution> {
        let history = self.history.lock().expect("execution history poisoned");
        history.iter().rev().take(limit).rev().cloned().collect()
    }

    /// Declaration-order execution. Each completed step's result becomes
    /// visible to later steps under `context.<step_id>`.
    async fn run_sequential(
        &self,
        definition: &WorkflowDefinition,
        execution: &mut WorkflowExecution,
    ) {
        let mut context = serde_json::Map::new();

        for step in &definition.steps {
            if let Some(entry) = execution.step_results.get_mut(&step.step_id) {
                entry.status = StepStatus::Running;
            }
            let input = step_input(step, &execution.input, &context);
            let outcome = run_step(
                Arc::clone(&self.invoker),
                step.clone(),
                input,
                self.config.backoff_base,
            )
            .await;

            if outcome.status == StepStatus::Completed {
                if let Some(data) = &outcome.result {
                    context.insert(step.step_id.clone(), data.clone());
                }
            }
            let failed = outcome.status == StepStatus::Failed;
            if failed {
                execution.errors.push(format!(
                    "step {}: {}",
                    step.step_id,
                    outcome.error.as_deref().unwrap_or("failed")
                ));
            }
            execution.step_results.insert(step.step_id.clone(), outcome);

            if failed && !step.continue_on_failure && definition.stop_on_first_failure {
                execution.status = WorkflowStatus::Failed;
                break;
            }
        }
    }

    /// Dependency-tick execution. Every step whose dependencies are in a
    /// terminal successful (or continue-on-failure) state is dispatched
    /// concurrently; a tick with pending steps but nothing runnable halts
    /// the run with a "no runnable steps" error.
    async fn run_parallel(
        &self,
        definition: &WorkflowDefinition,
        execution: &mut WorkflowExecution,
    ) {
        let steps: HashMap<&str, &WorkflowStep> = definition
            .steps
            .iter()
            .map(|s| (s.step_id.as_str(), s))
            .collect();

        loop {
            // Steps behind a hard-failed dependency can never start; fail
            // them so every step still reaches a terminal state.
            loop {
                let mut cascaded = Vec::new();
                for step in &definition.steps {
                    let pending = execution.step_results[&step.step_id].status == StepStatus::Pending;
                    if !pending {
                        continue;
                    }
                    let blocked_by = step.depends_on.iter().find(|dep| {
                        execution.step_results[dep.as_str()].status == StepStatus::Failed
                            && !steps[dep.as_str()].continue_on_failure
                    });
                    if let Some(dep) = blocked_by {
                        cascaded.push((step.step_id.clone(), dep.clone()));
                    }
                }
                if cascaded.is_empty() {
                    break;
                }
                for (step_id, dep) in cascaded {
                    let reason = format!("dependency {} failed", dep);
                    execution.errors.push(format!("step {}: {}", step_id, reason));
                    if let Some(entry) = execution.step_results.get_mut(&step_id) {
                        entry.status = StepStatus::Failed;
                        entry.error = Some(reason);
                    }
                }
            }

            if definition.stop_on_first_failure
                && execution.count_with_status(StepStatus::Failed) > 0
            {
                execution.status = WorkflowStatus::Failed;
                break;
            }

            let runnable: Vec<&WorkflowStep> = definition
                .steps
                .iter()
                .filter(|step| execution.step_results[&step.step_id].status == StepStatus::Pending)
                .filter(|step| {
                    step.depends_on.iter().all(|dep| {
                        let outcome = &execution.step_results[dep.as_str()];
                        outcome.status == StepStatus::Completed
                            || (outcome.status == StepStatus::Failed
                                && steps[dep.as_str()].continue_on_failure)
                    })
                })
                .collect();

            if runnable.is_empty() {
                let pending: Vec<String> = execution
                    .step_results
                    .iter()
                    .filter(|(_, o)| !o.status.is_terminal())
                    .map(|(id, _)| id.clone())
                    .collect();
                if pending.is_empty() {
                    break;
                }
                let error = WorkflowError::NoRunnableSteps {
                    execution_id: execution.execution_id,
                    pending,
                };
                tracing::warn!(
                    workflow_id = %execution.workflow_id,
                    execution_id = %execution.execution_id,
                    error = %error,
                    "Workflow halted"
                );
                execution.errors.push(error.to_string());
                execution.status = WorkflowStatus::Failed;
                break;
            }

            let mut join_set = JoinSet::new();
            for step in runnable {
                if let Some(entry) = execution.step_results.get_mut(&step.step_id) {
                    entry.status = StepStatus::Running;
                }
                // Dependency results are the step's visible context.
                let mut context = serde_json::Map::new();
                for dep in &step.depends_on {
                    if let Some(data) = &execution.step_results[dep.as_str()].result {
                        context.insert(dep.clone(), data.clone());
                    }
                }
                let input = step_input(step, &execution.input, &context);
                let invoker = Arc::clone(&self.invoker);
                let owned = step.clone();
                let backoff = self.config.backoff_base;
                join_set.spawn(async move {
                    let step_id = owned.step_id.clone();
                    (step_id, run_step(invoker, owned, input, backoff).await)
                });
            }

            while let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok((step_id, outcome)) => {
                        if outcome.status == StepStatus::Failed {
                            execution.errors.push(format!(
                                "step {}: {}",
                                step_id,
                                outcome.error.as_deref().unwrap_or("failed")
                            ));
                        }
                        execution.step_results.insert(step_id, outcome);
                    }
                    Err(join_error) => {
                        execution
                            .errors
                            .push(format!("step task aborted: {}", join_error));
                    }
                }
            }
        }
    }
}

/// One step invocation with timeout and linear-backoff retries.
async fn run_step(
    invoker: Arc<dyn AgentInvoker>,
    step: WorkflowStep,
    input: serde_json::Value,
    backoff_base: Duration,
) -> StepOutcome {
    let max_attempts = step.max_retries + 1;
    let mut last_error = String::new();

    for attempt in 1..=max_attempts {
        match tokio::time::timeout(step.timeout, invoker.invoke(&step.agent_id, input.clone()))
            .await
        {
            Err(_) => {
                last_error = WorkflowError::StepTimeout {
                    step_id: step.step_id.clone(),
                    timeout: step.timeout,
                }
                .to_string();
            }
            Ok(Err(e)) => {
                last_error = e.to_string();
            }
            Ok(Ok(result)) if result.success => {
                return StepOutcome {
                    status: StepStatus::Completed,
                    result: Some(result.data),
                    attempts: attempt,
                    error: None,
                };
            }
            Ok(Ok(result)) => {
                last_error = result
                    .data
                    .get("error")
                    .and_then(|v| v.as_str())
                    .unwrap_or("agent reported failure")
                    .to_string();
            }
        }

        tracing::warn!(
            step_id = %step.step_id,
            agent_id = %step.agent_id,
            attempt,
            max_attempts,
            error = %last_error,
            "Step attempt failed"
        );
        if attempt < max_attempts {
            tokio::time::sleep(backoff_base * attempt).await;
        }
    }

    StepOutcome {
        status: StepStatus::Failed,
        result: None,
        attempts: max_attempts,
        error: Some(last_error),
    }
}

/// Assemble a step's invocation input from its template, the workflow input,
/// and the visible context.
fn step_input(
    step: &WorkflowStep,
    workflow_input: &serde_json::Value,
    context: &serde_json::Map<String, serde_json::Value>,
) -> serde_json::Value {
    let mut object = match &step.input {
        serde_json::Value::Object(map) => map.clone(),
        serde_json::Value::Null => serde_json::Map::new(),
        other => {
            let mut map = serde_json::Map::new();
            map.insert("params".to_string(), other.clone());
            map
        }
    };
    object.insert("workflow_input".to_string(), workflow_input.clone());
    if !context.is_empty() {
        object.insert(
            "context".to_string(),
            serde_json::Value::Object(context.clone()),
        );
    }
    serde_json::Value::Object(object)
}

// ============================================================================
// TESTS
// ============================================================================
