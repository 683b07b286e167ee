//! Trigger engine: rules mapping events to agent invocations.
//!
//! Each rule gates its firing on a cooldown, a sliding one-hour cap, and an
//! optional structured condition against the event payload. A firing is
//! recorded the moment the gates pass - downstream agent failures do not
//! give the rule its shot back.

use crate::{EventBus, SubscriberCallback};
use chrono::{Duration as ChronoDuration, Utc};
use maestro_core::{AgentInvoker, Event, EventType, MaestroResult, Timestamp, TriggerError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

// ============================================================================
// CONDITIONS
// ============================================================================

/// Structured check against one event payload field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TriggerCondition {
    Eq {
        field: String,
        value: serde_json::Value,
    },
    Gt {
        field: String,
        value: f64,
    },
    Gte {
        field: String,
        value: f64,
    },
    Lt {
        field: String,
        value: f64,
    },
    Lte {
        field: String,
        value: f64,
    },
    Between {
        field: String,
        low: f64,
        high: f64,
    },
}

impl TriggerCondition {
    /// Whether the event payload satisfies this condition. A missing or
    /// non-numeric field fails numeric checks.
    pub fn matches(&self, event: &Event) -> bool {
        let numeric = |field: &str| event.payload_field(field).and_then(|v| v.as_f64());
        match self {
            TriggerCondition::Eq { field, value } => event.payload_field(field) == Some(value),
            TriggerCondition::Gt { field, value } => {
                numeric(field).map(|v| v > *value).unwrap_or(false)
            }
            TriggerCondition::Gte { field, value } => {
                numeric(field).map(|v| v >= *value).unwrap_or(false)
            }
            TriggerCondition::Lt { field, value } => {
                numeric(field).map(|v| v < *value).unwrap_or(false)
            }
            TriggerCondition::Lte { field, value } => {
                numeric(field).map(|v| v <= *value).unwrap_or(false)
            }
            TriggerCondition::Between { field, low, high } => numeric(field)
                .map(|v| v >= *low && v <= *high)
                .unwrap_or(false),
        }
    }
}

// ============================================================================
// RULES
// ============================================================================

/// One trigger rule: events of the listed types invoke the target agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerRule {
    pub rule_id: String,
    pub event_types: Vec<EventType>,
    /// Agents to invoke when the rule fires
    pub targets: Vec<String>,
    pub condition: Option<TriggerCondition>,
    /// Minimum spacing between firings
    #[serde(with = "duration_secs")]
    pub cooldown: Duration,
    /// Cap on firings within a sliding one-hour window
    pub max_per_hour: u32,
}

impl TriggerRule {
    fn validate(&self) -> Result<(), TriggerError> {
        if self.rule_id.is_empty() {
            return Err(TriggerError::InvalidRule {
                rule_id: "<empty>".to_string(),
                reason: "rule id must not be empty".to_string(),
            });
        }
        if self.event_types.is_empty() {
            return Err(TriggerError::InvalidRule {
                rule_id: self.rule_id.clone(),
                reason: "no event types".to_string(),
            });
        }
        if self.targets.is_empty() {
            return Err(TriggerError::InvalidRule {
                rule_id: self.rule_id.clone(),
                reason: "no target agents".to_string(),
            });
        }
        if self.max_per_hour == 0 {
            return Err(TriggerError::InvalidRule {
                rule_id: self.rule_id.clone(),
                reason: "max_per_hour must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Introspection view of a rule's gating state.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerRuleState {
    pub last_fired: Option<Timestamp>,
    pub fires_in_window: usize,
}

#[derive(Debug, Default)]
struct RuleState {
    last_fired: Option<Timestamp>,
    window: VecDeque<Timestamp>,
}

// ============================================================================
// METRICS
// ============================================================================

/// Counters for trigger activity.
#[derive(Debug, Default)]
pub struct TriggerMetrics {
    pub fires: AtomicU64,
    pub suppressed_cooldown: AtomicU64,
    pub suppressed_rate: AtomicU64,
    pub suppressed_condition: AtomicU64,
    pub target_failures: AtomicU64,
}

impl TriggerMetrics {
    pub fn snapshot(&self) -> TriggerSnapshot {
        TriggerSnapshot {
            fires: self.fires.load(Ordering::Relaxed),
            suppressed_cooldown: self.suppressed_cooldown.load(Ordering::Relaxed),
            suppressed_rate: self.suppressed_rate.load(Ordering::Relaxed),
            suppressed_condition: self.suppressed_condition.load(Ordering::Relaxed),
            target_failures: self.target_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the trigger counters.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggerSnapshot {
    pub fires: u64,
    pub suppressed_cooldown: u64,
    pub suppressed_rate: u64,
    pub suppressed_condition: u64,
    pub target_failures: u64,
}

// ============================================================================
// ENGINE
// ============================================================================

/// Maps incoming events to agent invocations, with cooldown and rate gating.
pub struct TriggerEngine {
    rules: RwLock<HashMap<String, TriggerRule>>,
    states: Mutex<HashMap<String, RuleState>>,
    invoker: Arc<dyn AgentInvoker>,
    metrics: Arc<TriggerMetrics>,
}

impl TriggerEngine {
    pub fn new(invoker: Arc<dyn AgentInvoker>) -> Self {
        Self {
            rules: RwLock::new(HashMap::new()),
            states: Mutex::new(HashMap::new()),
            invoker,
            metrics: Arc::new(TriggerMetrics::default()),
        }
    }

    /// Register a rule. Rules are a static catalog loaded at startup;
    /// duplicates and malformed rules are rejected.
    pub fn add_rule(&self, rule: TriggerRule) -> MaestroResult<()> {
        rule.validate()?;
        let mut rules = self.rules.write().expect("rule table poisoned");
        if rules.contains_key(&rule.rule_id) {
            return Err(TriggerError::DuplicateRule {
                rule_id: rule.rule_id,
            }
            .into());
        }
        tracing::info!(
            rule_id = %rule.rule_id,
            targets = rule.targets.len(),
            cooldown_secs = rule.cooldown.as_secs(),
            max_per_hour = rule.max_per_hour,
            "Trigger rule registered"
        );
        rules.insert(rule.rule_id.clone(), rule);
        Ok(())
    }

    /// Remove a rule and its gating state.
    pub fn remove_rule(&self, rule_id: &str) -> MaestroResult<()> {
        let removed = self
            .rules
            .write()
            .expect("rule table poisoned")
            .remove(rule_id);
        if removed.is_none() {
            return Err(TriggerError::RuleNotFound {
                rule_id: rule_id.to_string(),
            }
            .into());
        }
        self.states.lock().expect("rule state poisoned").remove(rule_id);
        Ok(())
    }

    /// Gating state of a rule, for introspection.
    pub fn rule_state(&self, rule_id: &str) -> Option<TriggerRuleState> {
        let states = self.states.lock().expect("rule state poisoned");
        states.get(rule_id).map(|s| TriggerRuleState {
            last_fired: s.last_fired,
            fires_in_window: s.window.len(),
        })
    }

    /// Trigger activity counters.
    pub fn metrics(&self) -> Arc<TriggerMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Subscribe the engine to the bus for every event type any current rule
    /// watches. Call after the rule catalog is loaded.
    pub fn attach(self: &Arc<Self>, bus: &EventBus, priority: i32) {
        let event_types: Vec<EventType> = {
            let rules = self.rules.read().expect("rule table poisoned");
            let mut types: Vec<EventType> = rules
                .values()
                .flat_map(|r| r.event_types.iter().cloned())
                .collect();
            types.sort_by(|a, b| a.as_str().cmp(b.as_str()));
            types.dedup();
            types
        };

        let engine = Arc::clone(self);
        let callback: SubscriberCallback = Arc::new(move |event| {
            let engine = Arc::clone(&engine);
            Box::pin(async move {
                engine.handle_event(&event).await;
                Ok(())
            })
        });
        bus.subscribe("trigger_engine", event_types, callback, None, priority);
    }

    /// Evaluate every matching rule against an event.
    pub async fn handle_event(&self, event: &Event) {
        self.handle_event_at(event, Utc::now()).await;
    }

    /// Clock-injected evaluation; `handle_event` passes the current time.
    pub async fn handle_event_at(&self, event: &Event, now: Timestamp) {
        let matching: Vec<TriggerRule> = {
            let rules = self.rules.read().expect("rule table poisoned");
            rules
                .values()
                .filter(|r| r.event_types.contains(&event.event_type))
                .cloned()
                .collect()
        };

        for rule in matching {
            if !self.should_fire(&rule, event, now) {
                continue;
            }
            self.fire(&rule, event);
        }
    }

    /// Apply the gates in order: cooldown, hourly cap, condition. Records the
    /// firing (cooldown timestamp + window entry) when all gates pass.
    fn should_fire(&self, rule: &TriggerRule, event: &Event, now: Timestamp) -> bool {
        let mut states = self.states.lock().expect("rule state poisoned");
        let state = states.entry(rule.rule_id.clone()).or_default();

        if let Some(last) = state.last_fired {
            let elapsed = now.signed_duration_since(last);
            if elapsed < ChronoDuration::from_std(rule.cooldown).unwrap_or_default() {
                self.metrics.suppressed_cooldown.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(rule_id = %rule.rule_id, "Trigger suppressed: cooldown");
                return false;
            }
        }

        let window_start = now - ChronoDuration::hours(1);
        while state.window.front().map(|t| *t < window_start).unwrap_or(false) {
            state.window.pop_front();
        }
        if state.window.len() >= rule.max_per_hour as usize {
            self.metrics.suppressed_rate.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(rule_id = %rule.rule_id, "Trigger suppressed: hourly cap");
            return false;
        }

        if let Some(condition) = &rule.condition {
            if !condition.matches(event) {
                self.metrics.suppressed_condition.fetch_add(1, Ordering::Relaxed);
                return false;
            }
        }

        // All gates passed: record the firing before any target runs.
        state.last_fired = Some(now);
        state.window.push_back(now);
        true
    }

    /// Invoke every target with the triggering event's payload.
    /// Fire-and-continue: target failures are logged, never propagated.
    fn fire(&self, rule: &TriggerRule, event: &Event) {
        self.metrics.fires.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            rule_id = %rule.rule_id,
            event_id = %event.event_id,
            event_type = %event.event_type,
            targets = rule.targets.len(),
            "Trigger fired"
        );

        let input = json!({
            "event_id": event.event_id,
            "event_type": event.event_type,
            "payload": event.payload,
            "tenant_id": event.tenant_id,
            "correlation_id": event.correlation_id,
        });

        for target in &rule.targets {
            let invoker = Arc::clone(&self.invoker);
            let metrics = Arc::clone(&self.metrics);
            let target = target.clone();
            let rule_id = rule.rule_id.clone();
            let input = input.clone();
            tokio::spawn(async move {
                match invoker.invoke(&target, input).await {
                    Ok(result) if result.success => {
                        tracing::debug!(rule_id = %rule_id, target = %target, "Trigger target completed");
                    }
                    Ok(_) => {
                        metrics.target_failures.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(rule_id = %rule_id, target = %target, "Trigger target reported failure");
                    }
                    Err(e) => {
                        metrics.target_failures.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(rule_id = %rule_id, target = %target, error = %e, "Trigger target failed");
                    }
                }
            });
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
