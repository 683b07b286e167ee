//! Agent invocation contract.
//!
//! The host application supplies the actual agents (LLM-backed analysis
//! functions, provider API wrappers). The orchestration layer only sees this
//! narrow functional interface.

use crate::{Decision, MaestroResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

// ============================================================================
// AGENT RESULT
// ============================================================================

/// What an agent invocation produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResult {
    /// Whether the agent considers the invocation successful
    pub success: bool,
    /// Agent-specific structured output
    pub data: serde_json::Value,
    /// Decision carried in the result, if the agent made one itself
    pub decision: Option<Decision>,
    /// Self-assessed output quality, 0.0 to 1.0
    pub quality_score: Option<f32>,
}

impl AgentResult {
    /// A successful result with data only.
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data,
            decision: None,
            quality_score: None,
        }
    }

    /// A failed result.
    pub fn failure(data: serde_json::Value) -> Self {
        Self {
            success: false,
            data,
            decision: None,
            quality_score: None,
        }
    }

    /// Attach a decision made by the agent itself.
    pub fn with_decision(mut self, decision: Decision) -> Self {
        self.decision = Some(decision);
        self
    }

    /// Attach a self-assessed quality score.
    pub fn with_quality(mut self, quality_score: f32) -> Self {
        self.quality_score = Some(quality_score.clamp(0.0, 1.0));
        self
    }

    /// Numeric analysis score, read from the `score` field of the data
    /// payload when present.
    pub fn score(&self) -> Option<f32> {
        self.data.get("score").and_then(|v| v.as_f64()).map(|v| v as f32)
    }
}

// ============================================================================
// INVOKER TRAIT
// ============================================================================

/// Host-supplied agent invocation function.
/// Implementations must be thread-safe (Send + Sync).
///
/// # Example
/// ```ignore
/// struct HttpAgentInvoker { /* ... */ }
///
/// #[async_trait]
/// impl AgentInvoker for HttpAgentInvoker {
///     async fn invoke(&self, agent_id: &str, input: Value) -> MaestroResult<AgentResult> {
///         // Call the agent service
///     }
/// }
/// ```
#[async_trait]
pub trait AgentInvoker: Send + Sync {
    /// Invoke the agent identified by `agent_id` with a JSON input.
    ///
    /// # Returns
    /// * `Ok(AgentResult)` - The agent ran; inspect `success` for its outcome
    /// * `Err(MaestroError)` - The agent could not be reached or crashed
    async fn invoke(&self, agent_id: &str, input: serde_json::Value) -> MaestroResult<AgentResult>;
}

// ============================================================================
// TESTS
// ============================================================================
