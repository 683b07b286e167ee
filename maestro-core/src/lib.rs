//! MAESTRO Core - Shared Types
//!
//! Pure data structures and narrow trait contracts. All other crates depend
//! on this. This crate contains ONLY data types and the functional interfaces
//! the orchestration layer exposes to host code - no coordination logic.

use chrono::{DateTime, Utc};
use uuid::Uuid;

mod action;
mod agent;
mod decision;
mod error;
mod event;
mod memory;

pub use action::{
    ActionExecutor, ActionRequest, ActionType, ApprovalState, ExecutionResult, ExecutionStatus,
    RiskTier,
};
pub use agent::{AgentInvoker, AgentResult};
pub use decision::{AutonomyLevel, Decision, DecisionAction, DecisionBands};
pub use error::{
    ActionError, BusError, ConfigError, MaestroError, MaestroResult, PolicyError, ScheduleError,
    TriggerError, WorkflowError,
};
pub use event::{Event, EventPriority, EventType};
pub use memory::{MemoryEntry, MemoryStore};

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Entity identifier using UUIDv7 for timestamp-sortable IDs.
/// UUIDv7 embeds a Unix timestamp, making IDs naturally sortable by creation time.
pub type EntityId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Generate a new UUIDv7 EntityId (timestamp-sortable).
pub fn new_entity_id() -> EntityId {
    Uuid::now_v7()
}

// ============================================================================
// TESTS
// ============================================================================
