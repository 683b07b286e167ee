//! Action requests and execution results.
//!
//! An `ActionRequest` is a candidate side-effecting action produced by the
//! decision loop. It is either auto-executed through a registered
//! `ActionExecutor` or routed to the approval queue - never both. Every
//! executor returns the same canonical `ExecutionResult`.

use crate::{new_entity_id, EntityId, Timestamp};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// ACTION TYPE
// ============================================================================

/// The closed set of side-effecting actions the orchestration layer can
/// request. Executors are registered against these variants and validated at
/// registration time; an unregistered variant resolves to a no-op executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Publish generated content to an external channel
    PublishContent,
    /// Ask a generation agent for new content
    GenerateContent,
    /// Queue content for a later publishing slot
    ScheduleContent,
    /// Notify a human (digest, alert)
    SendNotification,
    /// Change campaign parameters (budget split, targeting)
    AdjustCampaign,
    /// Re-pull analytics for a tenant
    RefreshAnalytics,
    /// Reply to or act on audience interactions
    EngageAudience,
    /// Explicit do-nothing action
    NoOp,
}

impl ActionType {
    /// All variants, for registry validation and iteration.
    pub const ALL: [ActionType; 8] = [
        ActionType::PublishContent,
        ActionType::GenerateContent,
        ActionType::ScheduleContent,
        ActionType::SendNotification,
        ActionType::AdjustCampaign,
        ActionType::RefreshAnalytics,
        ActionType::EngageAudience,
        ActionType::NoOp,
    ];

    /// Stable snake_case name, used for policy-engine action keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::PublishContent => "publish_content",
            ActionType::GenerateContent => "generate_content",
            ActionType::ScheduleContent => "schedule_content",
            ActionType::SendNotification => "send_notification",
            ActionType::AdjustCampaign => "adjust_campaign",
            ActionType::RefreshAnalytics => "refresh_analytics",
            ActionType::EngageAudience => "engage_audience",
            ActionType::NoOp => "no_op",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// RISK AND APPROVAL
// ============================================================================

/// Risk classification for a candidate action.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    #[default]
    Low,
    Medium,
    High,
}

/// Where an action sits in the human-approval lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalState {
    /// Gating has not run yet
    #[default]
    Unreviewed,
    /// Passed every gate and was executed directly
    AutoApproved,
    /// Waiting for a human decision
    Pending,
    /// A human approved the action
    Approved,
    /// A human rejected the action
    Rejected,
}

// ============================================================================
// ACTION REQUEST
// ============================================================================

/// A candidate side-effecting action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    /// Unique identifier for this request
    pub action_id: EntityId,
    /// Which executor capability this action needs
    pub action_type: ActionType,
    /// Executor-specific parameters
    pub parameters: serde_json::Value,
    /// Confidence the decision loop assigned, 0.0 to 1.0
    pub confidence: f32,
    /// Risk classification
    pub risk: RiskTier,
    /// Approval lifecycle state
    pub approval: ApprovalState,
    /// Transient-failure retry budget for the executor
    pub max_retries: u32,
    /// Tenant the action belongs to, if scoped
    pub tenant_id: Option<String>,
    /// When the request was created
    pub created_at: Timestamp,
}

impl ActionRequest {
    /// Create a new unreviewed action request.
    pub fn new(action_type: ActionType, parameters: serde_json::Value, confidence: f32) -> Self {
        Self {
            action_id: new_entity_id(),
            action_type,
            parameters,
            confidence: confidence.clamp(0.0, 1.0),
            risk: RiskTier::default(),
            approval: ApprovalState::default(),
            max_retries: 2,
            tenant_id: None,
            created_at: Utc::now(),
        }
    }

    /// Set the risk tier.
    pub fn with_risk(mut self, risk: RiskTier) -> Self {
        self.risk = risk;
        self
    }

    /// Scope the action to a tenant.
    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Set the retry budget.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

// ============================================================================
// EXECUTION RESULT
// ============================================================================

/// Terminal status of an executed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Completed,
    Failed,
    Skipped,
}

/// Outcome of one `ActionRequest`. The single canonical result type every
/// executor returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Whether the action achieved its effect
    pub success: bool,
    /// Terminal status
    pub status: ExecutionStatus,
    /// Identifier assigned by the external system, if any
    pub external_id: Option<String>,
    /// Cost incurred, in account currency units
    pub cost: f64,
    /// How many retries the executor consumed
    pub retry_count: u32,
    /// Failure description, if the action failed
    pub error: Option<String>,
}

impl ExecutionResult {
    /// A successful execution.
    pub fn completed(external_id: Option<String>, cost: f64) -> Self {
        Self {
            success: true,
            status: ExecutionStatus::Completed,
            external_id,
            cost,
            retry_count: 0,
            error: None,
        }
    }

    /// A failed execution.
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            status: ExecutionStatus::Failed,
            external_id: None,
            cost: 0.0,
            retry_count: 0,
            error: Some(error.into()),
        }
    }

    /// An intentionally skipped execution (no-op fallback).
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            success: true,
            status: ExecutionStatus::Skipped,
            external_id: None,
            cost: 0.0,
            retry_count: 0,
            error: Some(reason.into()),
        }
    }

    /// Record the retry count consumed producing this result.
    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }
}

// ============================================================================
// EXECUTOR TRAIT
// ============================================================================

/// Capability that carries out one kind of action.
/// Implementations must be thread-safe (Send + Sync) and must not panic;
/// failures are reported through the returned `ExecutionResult`.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Execute the action and report its outcome.
    async fn execute(&self, request: &ActionRequest) -> ExecutionResult;

    /// Human-readable executor name for logs.
    fn name(&self) -> &str;
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_action_type_round_trip() {
        for action_type in ActionType::ALL {
            let encoded = serde_json::to_string(&action_type).unwrap();
            assert_eq!(encoded, format!("\"{}\"", action_type.as_str()));
            let decoded: ActionType = serde_json::from_str(&encoded).unwrap();
            assert_eq!(decoded, action_type);
        }
    }

    #[test]
    fn test_unknown_action_type_is_rejected() {
        let result: Result<ActionType, _> = serde_json::from_str("\"launch_rocket\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_action_request_clamps_confidence() {
        let request = ActionRequest::new(ActionType::NoOp, json!({}), 1.7);
        assert_eq!(request.confidence, 1.0);
        assert_eq!(request.approval, ApprovalState::Unreviewed);
    }

    #[test]
    fn test_risk_tier_ordering() {
        assert!(RiskTier::High > RiskTier::Medium);
        assert!(RiskTier::Medium > RiskTier::Low);
    }

    #[test]
    fn test_execution_result_constructors() {
        let ok = ExecutionResult::completed(Some("post-91".to_string()), 0.02);
        assert!(ok.success);
        assert_eq!(ok.status, ExecutionStatus::Completed);

        let err = ExecutionResult::failed("provider 503");
        assert!(!err.success);
        assert_eq!(err.status, ExecutionStatus::Failed);
        assert_eq!(err.error.as_deref(), Some("provider 503"));

        let skipped = ExecutionResult::skipped("no executor registered");
        assert!(skipped.success);
        assert_eq!(skipped.status, ExecutionStatus::Skipped);
    }
}
