//! Approval queue for actions that failed auto-approval gating.

use chrono::Utc;
use maestro_core::{
    new_entity_id, ActionError, ActionRequest, ApprovalState, EntityId, MaestroResult, Timestamp,
};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

/// A human-review item. Terminal once approved or rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalQueueEntry {
    pub entry_id: EntityId,
    pub action: ActionRequest,
    /// Why auto-execution was denied
    pub reason: String,
    pub status: ApprovalState,
    pub approver: Option<String>,
    pub created_at: Timestamp,
    pub resolved_at: Option<Timestamp>,
}

/// Holding area for actions awaiting a human decision.
pub struct ApprovalQueue {
    entries: RwLock<Vec<ApprovalQueueEntry>>,
    /// Oldest resolved entries are evicted past this cap
    cap: usize,
}

impl ApprovalQueue {
    pub fn new(cap: usize) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            cap,
        }
    }

    /// Queue an action for human review. The action's approval state is set
    /// to `Pending` on the stored copy.
    pub fn enqueue(&self, mut action: ActionRequest, reason: impl Into<String>) -> EntityId {
        action.approval = ApprovalState::Pending;
        let entry = ApprovalQueueEntry {
            entry_id: new_entity_id(),
            reason: reason.into(),
            action,
            status: ApprovalState::Pending,
            approver: None,
            created_at: Utc::now(),
            resolved_at: None,
        };
        let entry_id = entry.entry_id;
        tracing::info!(
            entry_id = %entry_id,
            action_type = %entry.action.action_type,
            reason = %entry.reason,
            "Action queued for approval"
        );

        let mut entries = self.entries.write().expect("approval queue poisoned");
        entries.push(entry);
        // Keep the queue bounded without dropping unresolved work.
        if entries.len() > self.cap {
            if let Some(idx) = entries
                .iter()
                .position(|e| e.status != ApprovalState::Pending)
            {
                entries.remove(idx);
            }
        }
        entry_id
    }

    /// Entries still waiting for a decision.
    pub fn pending(&self) -> Vec<ApprovalQueueEntry> {
        self.entries
            .read()
            .expect("approval queue poisoned")
            .iter()
            .filter(|e| e.status == ApprovalState::Pending)
            .cloned()
            .collect()
    }

    /// Look up an entry by id.
    pub fn get(&self, entry_id: EntityId) -> Option<ApprovalQueueEntry> {
        self.entries
            .read()
            .expect("approval queue poisoned")
            .iter()
            .find(|e| e.entry_id == entry_id)
            .cloned()
    }

    /// Approve a pending entry. Returns the resolved entry so the caller can
    /// hand its action to an executor.
    pub fn approve(
        &self,
        entry_id: EntityId,
        approver: impl Into<String>,
    ) -> MaestroResult<ApprovalQueueEntry> {
        self.resolve(entry_id, approver.into(), ApprovalState::Approved)
    }

    /// Reject a pending entry.
    pub fn reject(
        &self,
        entry_id: EntityId,
        approver: impl Into<String>,
    ) -> MaestroResult<ApprovalQueueEntry> {
        self.resolve(entry_id, approver.into(), ApprovalState::Rejected)
    }

    fn resolve(
        &self,
        entry_id: EntityId,
        approver: String,
        status: ApprovalState,
    ) -> MaestroResult<ApprovalQueueEntry> {
        let mut entries = self.entries.write().expect("approval queue poisoned");
        let entry = entries
            .iter_mut()
            .find(|e| e.entry_id == entry_id)
            .ok_or(ActionError::ApprovalNotFound { entry_id })?;
        if entry.status != ApprovalState::Pending {
            return Err(ActionError::ApprovalAlreadyResolved { entry_id }.into());
        }
        entry.status = status;
        entry.action.approval = status;
        entry.approver = Some(approver);
        entry.resolved_at = Some(Utc::now());
        tracing::info!(
            entry_id = %entry_id,
            status = ?status,
            approver = entry.approver.as_deref().unwrap_or(""),
            "Approval entry resolved"
        );
        Ok(entry.clone())
    }
}

impl Default for ApprovalQueue {
    fn default() -> Self {
        Self::new(500)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use maestro_core::ActionType;
    use serde_json::json;

    fn action() -> ActionRequest {
        ActionRequest::new(ActionType::PublishContent, json!({"content": "hi"}), 0.5)
    }

    #[test]
    fn test_enqueue_and_pending() {
        let queue = ApprovalQueue::default();
        let entry_id = queue.enqueue(action(), "confidence below threshold");
        let pending = queue.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].entry_id, entry_id);
        assert_eq!(pending[0].action.approval, ApprovalState::Pending);
    }

    #[test]
    fn test_approve_lifecycle() {
        let queue = ApprovalQueue::default();
        let entry_id = queue.enqueue(action(), "review");
        let resolved = queue.approve(entry_id, "ops@acme").unwrap();
        assert_eq!(resolved.status, ApprovalState::Approved);
        assert_eq!(resolved.approver.as_deref(), Some("ops@acme"));
        assert!(resolved.resolved_at.is_some());
        assert!(queue.pending().is_empty());

        // Terminal: a second decision is rejected.
        assert!(queue.reject(entry_id, "ops@acme").is_err());
    }

    #[test]
    fn test_reject_lifecycle() {
        let queue = ApprovalQueue::default();
        let entry_id = queue.enqueue(action(), "blocked type");
        let resolved = queue.reject(entry_id, "ops@acme").unwrap();
        assert_eq!(resolved.status, ApprovalState::Rejected);
    }

    #[test]
    fn test_unknown_entry() {
        let queue = ApprovalQueue::default();
        assert!(queue.approve(new_entity_id(), "nobody").is_err());
    }

    #[test]
    fn test_cap_evicts_resolved_not_pending() {
        let queue = ApprovalQueue::new(2);
        let first = queue.enqueue(action(), "r1");
        queue.approve(first, "ops").unwrap();
        queue.enqueue(action(), "r2");
        queue.enqueue(action(), "r3");

        // The resolved entry was evicted; both pending entries survive.
        assert!(queue.get(first).is_none());
        assert_eq!(queue.pending().len(), 2);
    }
}
