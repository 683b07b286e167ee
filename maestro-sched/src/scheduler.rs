//! Polling scheduler that fires due tasks through the agent invoker.

use crate::Frequency;
use chrono::Utc;
use maestro_core::{
    new_entity_id, AgentInvoker, EntityId, MaestroResult, ScheduleError, Timestamp,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// How often the polling loop wakes (default: 5 seconds)
    pub poll_interval: Duration,

    /// Default cap on how many times a recurring task fires before it is
    /// deactivated; `None` means unbounded (default: None)
    pub default_max_runs: Option<u32>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            default_max_runs: None,
        }
    }
}

impl SchedulerConfig {
    /// Create a SchedulerConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `MAESTRO_SCHED_POLL_INTERVAL_SECS`: polling interval (default: 5)
    /// - `MAESTRO_SCHED_DEFAULT_MAX_RUNS`: default run cap (default: unset)
    pub fn from_env() -> Self {
        let poll_interval = Duration::from_secs(
            std::env::var("MAESTRO_SCHED_POLL_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
        );
        let default_max_runs = std::env::var("MAESTRO_SCHED_DEFAULT_MAX_RUNS")
            .ok()
            .and_then(|s| s.parse().ok());
        Self {
            poll_interval,
            default_max_runs,
        }
    }

    /// Configuration for tests with a tight polling interval.
    pub fn development() -> Self {
        Self {
            poll_interval: Duration::from_millis(50),
            default_max_runs: None,
        }
    }
}

// ============================================================================
// TASK
// ============================================================================

/// A recurring or one-shot unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub task_id: EntityId,
    pub name: String,
    /// Agent the task invokes when it fires
    pub agent_id: String,
    /// Input template; run metadata is merged in at firing time
    pub input: serde_json::Value,
    pub frequency: Frequency,
    pub next_run: Timestamp,
    pub run_count: u32,
    pub max_runs: Option<u32>,
    pub active: bool,
    /// A firing is in flight; the poll loop skips running tasks
    pub running: bool,
    pub created_at: Timestamp,
    pub last_run: Option<Timestamp>,
}

// ============================================================================
// METRICS
// ============================================================================

/// Counters for scheduler activity.
#[derive(Debug, Default)]
pub struct SchedulerMetrics {
    pub poll_cycles: AtomicU64,
    pub tasks_fired: AtomicU64,
    pub task_failures: AtomicU64,
    pub tasks_deactivated: AtomicU64,
}

impl SchedulerMetrics {
    pub fn snapshot(&self) -> SchedulerSnapshot {
        SchedulerSnapshot {
            poll_cycles: self.poll_cycles.load(Ordering::Relaxed),
            tasks_fired: self.tasks_fired.load(Ordering::Relaxed),
            task_failures: self.task_failures.load(Ordering::Relaxed),
            tasks_deactivated: self.tasks_deactivated.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the scheduler counters.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerSnapshot {
    pub poll_cycles: u64,
    pub tasks_fired: u64,
    pub task_failures: u64,
    pub tasks_deactivated: u64,
}

// ============================================================================
// SCHEDULER
// ============================================================================

/// Fires scheduled tasks through the injected agent invoker.
pub struct Scheduler {
    /// Shared with spawned firings, which update run counts on completion
    tasks: Arc<RwLock<HashMap<EntityId, ScheduledTask>>>,
    invoker: Arc<dyn AgentInvoker>,
    config: SchedulerConfig,
    metrics: Arc<SchedulerMetrics>,
}

impl Scheduler {
    pub fn new(invoker: Arc<dyn AgentInvoker>, config: SchedulerConfig) -> Self {
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
            invoker,
            config,
            metrics: Arc::new(SchedulerMetrics::default()),
        }
    }

    /// Register a task. The frequency is validated up front; the first run
    /// is `first_run` when given, otherwise the next occurrence strictly
    /// after now (one-shot tasks with no explicit time fire on the next
    /// poll).
    pub fn schedule(
        &self,
        name: impl Into<String>,
        agent_id: impl Into<String>,
        input: serde_json::Value,
        frequency: Frequency,
        first_run: Option<Timestamp>,
    ) -> MaestroResult<EntityId> {
        frequency.validate()?;

        let now = Utc::now();
        let next_run = match first_run {
            Some(at) => at,
            None => frequency.next_run_after(now).unwrap_or(now),
        };

        let task = ScheduledTask {
            task_id: new_entity_id(),
            name: name.into(),
            agent_id: agent_id.into(),
            input,
            frequency,
            next_run,
            run_count: 0,
            max_runs: self.config.default_max_runs,
            active: true,
            running: false,
            created_at: now,
            last_run: None,
        };
        let task_id = task.task_id;

        tracing::info!(
            task_id = %task_id,
            name = %task.name,
            agent_id = %task.agent_id,
            next_run = %task.next_run,
            "Task scheduled"
        );

        self.tasks
            .write()
            .expect("task table poisoned")
            .insert(task_id, task);
        Ok(task_id)
    }

    /// Deactivate a task. Its in-flight firing, if any, is allowed to finish.
    pub fn cancel(&self, task_id: EntityId) -> MaestroResult<()> {
        let mut tasks = self.tasks.write().expect("task table poisoned");
        let task = tasks
            .get_mut(&task_id)
            .ok_or(ScheduleError::TaskNotFound { task_id })?;
        task.active = false;
        tracing::info!(task_id = %task_id, name = %task.name, "Task cancelled");
        Ok(())
    }

    /// Look up a task by id.
    pub fn get_task(&self, task_id: EntityId) -> Option<ScheduledTask> {
        self.tasks
            .read()
            .expect("task table poisoned")
            .get(&task_id)
            .cloned()
    }

    /// All registered tasks.
    pub fn list_tasks(&self) -> Vec<ScheduledTask> {
        self.tasks
            .read()
            .expect("task table poisoned")
            .values()
            .cloned()
            .collect()
    }

    /// Scheduler activity counters.
    pub fn metrics(&self) -> Arc<SchedulerMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Polling loop. Runs until the shutdown signal is received; in-flight
    /// firings finish on their own.
    pub async fn run(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        let mut poll = interval(self.config.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "Scheduler started"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("Scheduler shutting down");
                        break;
                    }
                }
                _ = poll.tick() => {
                    self.fire_due_tasks();
                }
            }
        }
    }

    /// Fire every due task independently. Each firing runs in its own spawned
    /// task so a slow agent cannot block the rest of the tick.
    fn fire_due_tasks(&self) {
        self.metrics.poll_cycles.fetch_add(1, Ordering::Relaxed);
        let now = Utc::now();

        let due: Vec<ScheduledTask> = {
            let mut tasks = self.tasks.write().expect("task table poisoned");
            tasks
                .values_mut()
                .filter(|t| t.active && !t.running && t.next_run <= now)
                .map(|t| {
                    t.running = true;
                    t.clone()
                })
                .collect()
        };

        for task in due {
            let invoker = Arc::clone(&self.invoker);
            let metrics = Arc::clone(&self.metrics);
            let tasks = Arc::clone(&self.tasks);
            tokio::spawn(async move {
                fire_task(task, invoker, metrics, tasks).await;
            });
        }
    }
}

/// One task firing: enrich the input with run metadata, invoke the agent,
/// then recompute the schedule.
async fn fire_task(
    task: ScheduledTask,
    invoker: Arc<dyn AgentInvoker>,
    metrics: Arc<SchedulerMetrics>,
    tasks: Arc<RwLock<HashMap<EntityId, ScheduledTask>>>,
) {
    let input = enrich_input(&task);
    metrics.tasks_fired.fetch_add(1, Ordering::Relaxed);

    let started = Utc::now();
    let outcome = invoker.invoke(&task.agent_id, input).await;
    match &outcome {
        Ok(result) if result.success => {
            tracing::debug!(task_id = %task.task_id, name = %task.name, "Task run completed");
        }
        Ok(_) => {
            metrics.task_failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(task_id = %task.task_id, name = %task.name, "Task run reported failure");
        }
        Err(e) => {
            metrics.task_failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(task_id = %task.task_id, name = %task.name, error = %e, "Task run failed");
        }
    }

    // Success and failure both advance the schedule.
    let mut table = tasks.write().expect("task table poisoned");
    let Some(entry) = table.get_mut(&task.task_id) else {
        return;
    };
    entry.running = false;
    entry.run_count += 1;
    entry.last_run = Some(started);

    let exhausted = entry
        .max_runs
        .map(|cap| entry.run_count >= cap)
        .unwrap_or(false);
    match entry.frequency.next_run_after(Utc::now()) {
        Some(next) if !exhausted => entry.next_run = next,
        _ => {
            entry.active = false;
            metrics.tasks_deactivated.fetch_add(1, Ordering::Relaxed);
            tracing::info!(
                task_id = %entry.task_id,
                name = %entry.name,
                run_count = entry.run_count,
                "Task deactivated"
            );
        }
    }
}

/// Merge run metadata into the task's input template.
fn enrich_input(task: &ScheduledTask) -> serde_json::Value {
    let metadata = json!({
        "task_id": task.task_id,
        "run_count": task.run_count,
        "scheduled_for": task.next_run,
    });
    match &task.input {
        serde_json::Value::Object(map) => {
            let mut merged = map.clone();
            merged.insert("_schedule".to_string(), metadata);
            serde_json::Value::Object(merged)
        }
        other => json!({ "input": other, "_schedule": metadata }),
    }
}

// ============================================================================
// TESTS
// ============================================================================
