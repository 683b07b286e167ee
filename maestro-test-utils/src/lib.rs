//! MAESTRO Test Utilities
//!
//! Centralized test infrastructure for the MAESTRO workspace:
//! - Mock implementations of the external-interface traits
//!   (`AgentInvoker`, `ActionExecutor`, `MemoryStore`)
//! - Tracing initialization for tests

// Re-export core types for convenience
pub use maestro_core::{
    ActionExecutor, ActionRequest, ActionType, AgentInvoker, AgentResult, Event, EventType,
    ExecutionResult, MemoryEntry, MemoryStore,
};

use async_trait::async_trait;
use chrono::Utc;
use maestro_core::{ActionError, MaestroResult, Timestamp};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, RwLock};
use std::time::Duration;

/// Initialize a test tracing subscriber honoring `RUST_LOG`. Safe to call
/// from multiple tests.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// MOCK AGENT INVOKER
// ============================================================================

/// One recorded invocation.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub agent_id: String,
    pub input: serde_json::Value,
    pub at: Timestamp,
}

/// Mock agent invoker with scripted per-agent behavior and a call log.
///
/// By default every agent returns a successful empty result. Agents can be
/// given fixed responses, artificial delays, hard errors, or a number of
/// failures before they start succeeding.
pub struct MockAgentInvoker {
    responses: RwLock<HashMap<String, AgentResult>>,
    delays: RwLock<HashMap<String, Duration>>,
    errors: RwLock<HashSet<String>>,
    failures_remaining: Mutex<HashMap<String, u32>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockAgentInvoker {
    pub fn new() -> Self {
        Self {
            responses: RwLock::new(HashMap::new()),
            delays: RwLock::new(HashMap::new()),
            errors: RwLock::new(HashSet::new()),
            failures_remaining: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Script a fixed response for an agent.
    pub fn with_response(self, agent_id: &str, result: AgentResult) -> Self {
        self.responses
            .write()
            .unwrap()
            .insert(agent_id.to_string(), result);
        self
    }

    /// Delay every invocation of an agent.
    pub fn with_delay(self, agent_id: &str, delay: Duration) -> Self {
        self.delays
            .write()
            .unwrap()
            .insert(agent_id.to_string(), delay);
        self
    }

    /// Make every invocation of an agent fail with an invocation error.
    pub fn with_error(self, agent_id: &str) -> Self {
        self.errors.write().unwrap().insert(agent_id.to_string());
        self
    }

    /// Make the first `count` invocations of an agent fail, then fall
    /// through to its scripted (or default) response.
    pub fn with_failures_before_success(self, agent_id: &str, count: u32) -> Self {
        self.failures_remaining
            .lock()
            .unwrap()
            .insert(agent_id.to_string(), count);
        self
    }

    /// All recorded calls, in invocation order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of recorded calls.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Recorded calls for one agent.
    pub fn calls_for(&self, agent_id: &str) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.agent_id == agent_id)
            .cloned()
            .collect()
    }
}

impl Default for MockAgentInvoker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentInvoker for MockAgentInvoker {
    async fn invoke(
        &self,
        agent_id: &str,
        input: serde_json::Value,
    ) -> MaestroResult<AgentResult> {
        self.calls.lock().unwrap().push(RecordedCall {
            agent_id: agent_id.to_string(),
            input,
            at: Utc::now(),
        });

        let delay = self.delays.read().unwrap().get(agent_id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.errors.read().unwrap().contains(agent_id) {
            return Err(ActionError::InvocationFailed {
                agent_id: agent_id.to_string(),
                reason: "scripted failure".to_string(),
            }
            .into());
        }

        {
            let mut remaining = self.failures_remaining.lock().unwrap();
            if let Some(count) = remaining.get_mut(agent_id) {
                if *count > 0 {
                    *count -= 1;
                    return Err(ActionError::InvocationFailed {
                        agent_id: agent_id.to_string(),
                        reason: "scripted transient failure".to_string(),
                    }
                    .into());
                }
            }
        }

        Ok(self
            .responses
            .read()
            .unwrap()
            .get(agent_id)
            .cloned()
            .unwrap_or_else(|| AgentResult::ok(serde_json::json!({"status": "ok"}))))
    }
}

// ============================================================================
// MOCK EXECUTOR
// ============================================================================

/// Mock action executor with a configurable result and an execution log.
pub struct MockExecutor {
    name: String,
    result: ExecutionResult,
    executed: Mutex<Vec<ActionRequest>>,
}

impl MockExecutor {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            result: ExecutionResult::completed(Some(format!("{}-ext", name)), 0.01),
            executed: Mutex::new(Vec::new()),
        }
    }

    /// Script the result every execution returns.
    pub fn with_result(mut self, result: ExecutionResult) -> Self {
        self.result = result;
        self
    }

    /// Actions executed so far.
    pub fn executed(&self) -> Vec<ActionRequest> {
        self.executed.lock().unwrap().clone()
    }

    /// Number of executions.
    pub fn execution_count(&self) -> usize {
        self.executed.lock().unwrap().len()
    }
}

#[async_trait]
impl ActionExecutor for MockExecutor {
    async fn execute(&self, request: &ActionRequest) -> ExecutionResult {
        self.executed.lock().unwrap().push(request.clone());
        self.result.clone()
    }

    fn name(&self) -> &str {
        &self.name
    }
}

// ============================================================================
// MOCK MEMORY STORE
// ============================================================================

/// In-memory memory store. Recall returns the most recent entries whose key,
/// content, or tags contain the query string.
pub struct MockMemoryStore {
    entries: RwLock<Vec<MemoryEntry>>,
}

impl MockMemoryStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Seed the store with an entry.
    pub fn with_entry(self, key: &str, content: &str, importance: f32) -> Self {
        self.entries.write().unwrap().push(MemoryEntry {
            key: key.to_string(),
            content: content.to_string(),
            importance,
            tags: Vec::new(),
            created_at: Utc::now(),
        });
        self
    }

    /// Everything stored so far.
    pub fn entries(&self) -> Vec<MemoryEntry> {
        self.entries.read().unwrap().clone()
    }
}

impl Default for MockMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryStore for MockMemoryStore {
    async fn store(
        &self,
        key: &str,
        content: &str,
        importance: f32,
        tags: &[String],
    ) -> MaestroResult<()> {
        self.entries.write().unwrap().push(MemoryEntry {
            key: key.to_string(),
            content: content.to_string(),
            importance,
            tags: tags.to_vec(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn get_context(&self, query: &str, limit: usize) -> MaestroResult<Vec<MemoryEntry>> {
        let entries = self.entries.read().unwrap();
        Ok(entries
            .iter()
            .rev()
            .filter(|e| {
                e.key.contains(query)
                    || e.content.contains(query)
                    || e.tags.iter().any(|t| t.contains(query))
            })
            .take(limit)
            .cloned()
            .collect())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_mock_invoker_default_response() {
        let invoker = MockAgentInvoker::new();
        let result = invoker.invoke("anyone", json!({})).await.unwrap();
        assert!(result.success);
        assert_eq!(invoker.call_count(), 1);
    }

    #[tokio::test]
    async fn test_mock_invoker_failures_then_success() {
        let invoker = MockAgentInvoker::new().with_failures_before_success("flaky", 2);
        assert!(invoker.invoke("flaky", json!({})).await.is_err());
        assert!(invoker.invoke("flaky", json!({})).await.is_err());
        assert!(invoker.invoke("flaky", json!({})).await.is_ok());
    }

    #[tokio::test]
    async fn test_mock_memory_recall_filters_and_limits() {
        let store = MockMemoryStore::new()
            .with_entry("a", "spring campaign notes", 0.5)
            .with_entry("b", "unrelated", 0.5)
            .with_entry("c", "campaign budget", 0.5);
        let recalled = store.get_context("campaign", 1).await.unwrap();
        assert_eq!(recalled.len(), 1);
        assert_eq!(recalled[0].key, "c");
    }
}
