//! MAESTRO Bus - Event Distribution and Triggers
//!
//! The publish/subscribe hub of the orchestration layer, and the trigger
//! engine built on top of it.
//!
//! # Delivery semantics
//!
//! At-most-once, in-memory, single-process. A background dispatch loop
//! dequeues one event at a time and fans it out to every matching
//! subscription in priority-then-registration order before touching the next
//! event. A failing subscriber is logged and skipped; it never blocks the
//! remaining subscribers. There is no redelivery and no persistence.
//!
//! # Usage
//!
//! ```ignore
//! use maestro_bus::{EventBus, BusConfig};
//! use tokio::sync::watch;
//!
//! let bus = Arc::new(EventBus::new(BusConfig::default()));
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! tokio::spawn(Arc::clone(&bus).run(shutdown_rx));
//!
//! bus.subscribe("dashboard", vec!["anomaly_detected".into()], callback, None, 10);
//! bus.publish(Event::new("anomaly_detected", "analytics", payload))?;
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! ```

mod bus;
mod trigger;

pub use bus::{BusConfig, BusMetrics, BusSnapshot, EventBus, EventFilter, SubscriberCallback};
pub use trigger::{
    TriggerCondition, TriggerEngine, TriggerMetrics, TriggerRule, TriggerRuleState,
    TriggerSnapshot,
};
