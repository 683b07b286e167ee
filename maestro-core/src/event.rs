//! Event types routed through the Event Bus.
//!
//! An `Event` is an immutable, typed fact with a JSON payload. Events are
//! created by publishers, fanned out to subscribers at most once each, and
//! retained in a bounded history until evicted.

use crate::{new_entity_id, EntityId, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// EVENT TYPE
// ============================================================================

/// Discriminator for the kind of fact an event carries.
///
/// Event types are free-form lowercase identifiers so that trigger rules and
/// subscriptions loaded from static configuration can name them directly.
/// Well-known types used by the built-in components are exposed as associated
/// constructors.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventType(String);

impl EventType {
    /// Create an event type from an identifier. Normalized to lowercase.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into().to_lowercase())
    }

    /// The identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Analytics metrics were refreshed for a tenant.
    pub fn metrics_updated() -> Self {
        Self::new("metrics_updated")
    }

    /// A metric moved outside its expected band.
    pub fn anomaly_detected() -> Self {
        Self::new("anomaly_detected")
    }

    /// A piece of content was published to an external channel.
    pub fn content_published() -> Self {
        Self::new("content_published")
    }

    /// An agent invocation finished.
    pub fn agent_completed() -> Self {
        Self::new("agent_completed")
    }

    /// Spend crossed a budget threshold.
    pub fn budget_alert() -> Self {
        Self::new("budget_alert")
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EventType {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for EventType {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

// ============================================================================
// EVENT PRIORITY
// ============================================================================

/// Relative urgency of an event. Informational for consumers; the bus itself
/// dispatches in arrival order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum EventPriority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

// ============================================================================
// EVENT
// ============================================================================

/// An immutable, typed notification with a payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier for this event
    pub event_id: EntityId,
    /// What kind of fact this is
    pub event_type: EventType,
    /// Tenant the event belongs to, if scoped
    pub tenant_id: Option<String>,
    /// Component or agent that published the event
    pub source: String,
    /// Structured payload
    pub payload: serde_json::Value,
    /// Relative urgency
    pub priority: EventPriority,
    /// Correlates events belonging to the same causal chain
    pub correlation_id: Option<EntityId>,
    /// When the event was created
    pub created_at: Timestamp,
    /// Subscriber ids that have already handled this event
    pub processed_by: Vec<String>,
}

impl Event {
    /// Create a new event with normal priority.
    pub fn new(
        event_type: impl Into<EventType>,
        source: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_id: new_entity_id(),
            event_type: event_type.into(),
            tenant_id: None,
            source: source.into(),
            payload,
            priority: EventPriority::Normal,
            correlation_id: None,
            created_at: Utc::now(),
            processed_by: Vec::new(),
        }
    }

    /// Scope the event to a tenant.
    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Set the priority.
    pub fn with_priority(mut self, priority: EventPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Link the event to a causal chain.
    pub fn with_correlation(mut self, correlation_id: EntityId) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Read a payload field, if the payload is an object.
    pub fn payload_field(&self, field: &str) -> Option<&serde_json::Value> {
        self.payload.as_object().and_then(|obj| obj.get(field))
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_type_is_normalized() {
        let et = EventType::new("Anomaly_Detected");
        assert_eq!(et.as_str(), "anomaly_detected");
        assert_eq!(et, EventType::anomaly_detected());
    }

    #[test]
    fn test_event_builder() {
        let correlation = crate::new_entity_id();
        let event = Event::new("metrics_updated", "analytics", json!({"ctr": 0.04}))
            .with_tenant("acme")
            .with_priority(EventPriority::High)
            .with_correlation(correlation);

        assert_eq!(event.event_type, EventType::metrics_updated());
        assert_eq!(event.tenant_id.as_deref(), Some("acme"));
        assert_eq!(event.priority, EventPriority::High);
        assert_eq!(event.correlation_id, Some(correlation));
        assert!(event.processed_by.is_empty());
    }

    #[test]
    fn test_payload_field() {
        let event = Event::new("metrics_updated", "analytics", json!({"ctr": 0.04}));
        assert_eq!(event.payload_field("ctr"), Some(&json!(0.04)));
        assert_eq!(event.payload_field("missing"), None);
    }

    #[test]
    fn test_priority_ordering() {
        assert!(EventPriority::Critical > EventPriority::High);
        assert!(EventPriority::High > EventPriority::Normal);
        assert!(EventPriority::Normal > EventPriority::Low);
    }
}
