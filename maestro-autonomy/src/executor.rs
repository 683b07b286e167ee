//! Executor registry: action type -> executor capability.
//!
//! Executors must be explicitly registered - no auto-discovery. Unknown
//! action types resolve to a logging no-op executor so the decision loop
//! degrades to observable inaction instead of failing.

use async_trait::async_trait;
use maestro_core::{
    ActionError, ActionExecutor, ActionRequest, ActionType, ExecutionResult, MaestroResult,
};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Fallback executor: logs the action and reports a skipped result.
pub struct NoOpExecutor;

#[async_trait]
impl ActionExecutor for NoOpExecutor {
    async fn execute(&self, request: &ActionRequest) -> ExecutionResult {
        tracing::info!(
            action_id = %request.action_id,
            action_type = %request.action_type,
            "No executor registered; action skipped"
        );
        ExecutionResult::skipped(format!(
            "no executor registered for {}",
            request.action_type
        ))
    }

    fn name(&self) -> &str {
        "no_op"
    }
}

/// Registry mapping the closed action-type enumeration to executors.
pub struct ExecutorRegistry {
    executors: RwLock<HashMap<ActionType, Arc<dyn ActionExecutor>>>,
    fallback: Arc<dyn ActionExecutor>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self {
            executors: RwLock::new(HashMap::new()),
            fallback: Arc::new(NoOpExecutor),
        }
    }

    /// Register an executor for an action type. Double registration is a
    /// configuration mistake and is rejected.
    pub fn register(
        &self,
        action_type: ActionType,
        executor: Arc<dyn ActionExecutor>,
    ) -> MaestroResult<()> {
        let mut executors = self.executors.write().expect("executor table poisoned");
        if executors.contains_key(&action_type) {
            return Err(ActionError::ExecutorAlreadyRegistered { action_type }.into());
        }
        tracing::info!(
            action_type = %action_type,
            executor = executor.name(),
            "Executor registered"
        );
        executors.insert(action_type, executor);
        Ok(())
    }

    /// Resolve the executor for an action type, falling back to the no-op
    /// executor when none is registered.
    pub fn resolve(&self, action_type: ActionType) -> Arc<dyn ActionExecutor> {
        self.executors
            .read()
            .expect("executor table poisoned")
            .get(&action_type)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.fallback))
    }

    /// Action types with a registered executor.
    pub fn registered_types(&self) -> Vec<ActionType> {
        self.executors
            .read()
            .expect("executor table poisoned")
            .keys()
            .copied()
            .collect()
    }
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use maestro_core::ExecutionStatus;
    use serde_json::json;

    struct FixedExecutor;

    #[async_trait]
    impl ActionExecutor for FixedExecutor {
        async fn execute(&self, _request: &ActionRequest) -> ExecutionResult {
            ExecutionResult::completed(Some("ext-1".to_string()), 0.01)
        }

        fn name(&self) -> &str {
            "fixed"
        }
    }

    #[tokio::test]
    async fn test_resolve_registered_executor() {
        let registry = ExecutorRegistry::new();
        registry
            .register(ActionType::PublishContent, Arc::new(FixedExecutor))
            .unwrap();

        let request = ActionRequest::new(ActionType::PublishContent, json!({}), 0.9);
        let result = registry.resolve(request.action_type).execute(&request).await;
        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(result.external_id.as_deref(), Some("ext-1"));
    }

    #[tokio::test]
    async fn test_unknown_type_falls_back_to_noop() {
        let registry = ExecutorRegistry::new();
        let request = ActionRequest::new(ActionType::EngageAudience, json!({}), 0.9);
        let result = registry.resolve(request.action_type).execute(&request).await;
        assert_eq!(result.status, ExecutionStatus::Skipped);
        assert!(result.success);
    }

    #[test]
    fn test_double_registration_rejected() {
        let registry = ExecutorRegistry::new();
        registry
            .register(ActionType::NoOp, Arc::new(NoOpExecutor))
            .unwrap();
        assert!(registry
            .register(ActionType::NoOp, Arc::new(NoOpExecutor))
            .is_err());
        assert_eq!(registry.registered_types(), vec![ActionType::NoOp]);
    }
}
