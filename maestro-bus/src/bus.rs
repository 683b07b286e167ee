//! Publish/subscribe hub with typed events and priority-ordered subscribers.

use futures_util::future::BoxFuture;
use maestro_core::{new_entity_id, BusError, EntityId, Event, EventType, MaestroResult};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::{mpsc, watch};

// ============================================================================
// CALLBACK TYPES
// ============================================================================

/// Async subscriber callback. Errors are caught and logged by the dispatch
/// loop; they never stop fan-out to the remaining subscribers.
pub type SubscriberCallback =
    Arc<dyn Fn(Event) -> BoxFuture<'static, Result<(), BusError>> + Send + Sync>;

/// Optional per-subscription filter applied after the event-type match.
pub type EventFilter = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Event bus configuration.
#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Bounded history size; oldest entries are evicted past this cap
    /// (default: 1000)
    pub history_cap: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self { history_cap: 1000 }
    }
}

impl BusConfig {
    /// Create a BusConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `MAESTRO_BUS_HISTORY_CAP`: bounded history size (default: 1000)
    pub fn from_env() -> Self {
        let history_cap = std::env::var("MAESTRO_BUS_HISTORY_CAP")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1000);
        Self { history_cap }
    }
}

// ============================================================================
// METRICS
// ============================================================================

/// Counters for bus activity.
#[derive(Debug, Default)]
pub struct BusMetrics {
    pub events_published: AtomicU64,
    pub events_dispatched: AtomicU64,
    pub deliveries: AtomicU64,
    pub subscriber_errors: AtomicU64,
    pub history_evicted: AtomicU64,
}

impl BusMetrics {
    pub fn snapshot(&self) -> BusSnapshot {
        BusSnapshot {
            events_published: self.events_published.load(Ordering::Relaxed),
            events_dispatched: self.events_dispatched.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            subscriber_errors: self.subscriber_errors.load(Ordering::Relaxed),
            history_evicted: self.history_evicted.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of the bus counters.
#[derive(Debug, Clone, PartialEq)]
pub struct BusSnapshot {
    pub events_published: u64,
    pub events_dispatched: u64,
    pub deliveries: u64,
    pub subscriber_errors: u64,
    pub history_evicted: u64,
}

// ============================================================================
// SUBSCRIPTION
// ============================================================================

struct Subscription {
    subscription_id: EntityId,
    subscriber_id: String,
    event_types: Vec<EventType>,
    callback: SubscriberCallback,
    filter: Option<EventFilter>,
    priority: i32,
    /// Registration order, for deterministic tie-breaking within a priority
    seq: u64,
}

// ============================================================================
// EVENT BUS
// ============================================================================

/// In-process publish/subscribe hub.
pub struct EventBus {
    subscriptions: RwLock<Vec<Subscription>>,
    history: Mutex<VecDeque<Event>>,
    tx: mpsc::UnboundedSender<Event>,
    /// Receiver parked here until `run` claims it
    rx: Mutex<Option<mpsc::UnboundedReceiver<Event>>>,
    next_seq: AtomicU64,
    config: BusConfig,
    metrics: Arc<BusMetrics>,
}

impl EventBus {
    pub fn new(config: BusConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            subscriptions: RwLock::new(Vec::new()),
            history: Mutex::new(VecDeque::new()),
            tx,
            rx: Mutex::new(Some(rx)),
            next_seq: AtomicU64::new(0),
            config,
            metrics: Arc::new(BusMetrics::default()),
        }
    }

    /// Enqueue an event for dispatch. Non-blocking; the event is appended to
    /// the bounded history immediately.
    pub fn publish(&self, event: Event) -> MaestroResult<EntityId> {
        let event_id = event.event_id;
        self.remember(event.clone());
        self.metrics.events_published.fetch_add(1, Ordering::Relaxed);
        self.tx.send(event).map_err(|_| BusError::QueueClosed)?;
        Ok(event_id)
    }

    /// Register a subscriber for a set of event types.
    pub fn subscribe(
        &self,
        subscriber_id: impl Into<String>,
        event_types: Vec<EventType>,
        callback: SubscriberCallback,
        filter: Option<EventFilter>,
        priority: i32,
    ) -> EntityId {
        let subscription = Subscription {
            subscription_id: new_entity_id(),
            subscriber_id: subscriber_id.into(),
            event_types,
            callback,
            filter,
            priority,
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
        };
        let subscription_id = subscription.subscription_id;
        tracing::debug!(
            subscriber_id = %subscription.subscriber_id,
            priority,
            "Subscriber registered"
        );
        self.subscriptions
            .write()
            .expect("subscription table poisoned")
            .push(subscription);
        subscription_id
    }

    /// Remove a subscriber's interest. With `event_types` given, only those
    /// types are removed; a subscription left with no types is dropped.
    /// Without, every subscription of the subscriber is dropped.
    pub fn unsubscribe(
        &self,
        subscriber_id: &str,
        event_types: Option<&[EventType]>,
    ) -> MaestroResult<()> {
        let mut subscriptions = self
            .subscriptions
            .write()
            .expect("subscription table poisoned");
        let before = subscriptions.len();

        match event_types {
            None => subscriptions.retain(|s| s.subscriber_id != subscriber_id),
            Some(types) => {
                for sub in subscriptions.iter_mut() {
                    if sub.subscriber_id == subscriber_id {
                        sub.event_types.retain(|t| !types.contains(t));
                    }
                }
                subscriptions
                    .retain(|s| s.subscriber_id != subscriber_id || !s.event_types.is_empty());
            }
        }

        if subscriptions.len() == before
            && !subscriptions
                .iter()
                .any(|s| s.subscriber_id == subscriber_id)
        {
            return Err(BusError::SubscriptionNotFound {
                subscriber_id: subscriber_id.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Dispatch loop. Dequeues events one at a time; each event is fully
    /// fanned out before the next is taken. Runs until the shutdown signal.
    pub async fn run(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        let mut rx = self
            .rx
            .lock()
            .expect("receiver slot poisoned")
            .take()
            .expect("bus dispatch loop already started");

        tracing::info!(history_cap = self.config.history_cap, "Event bus started");

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("Event bus shutting down");
                        break;
                    }
                }
                maybe_event = rx.recv() => {
                    match maybe_event {
                        Some(event) => {
                            self.dispatch(event).await;
                        }
                        None => break,
                    }
                }
            }
        }

        let snapshot = self.metrics.snapshot();
        tracing::info!(
            events_dispatched = snapshot.events_dispatched,
            deliveries = snapshot.deliveries,
            subscriber_errors = snapshot.subscriber_errors,
            "Event bus stopped"
        );
    }

    /// Dispatch an event synchronously, bypassing the queue. For test and
    /// startup paths; the event is still recorded in the history.
    pub async fn process_immediate(&self, event: Event) -> usize {
        self.remember(event.clone());
        self.metrics.events_published.fetch_add(1, Ordering::Relaxed);
        self.dispatch(event).await
    }

    /// Recent events, newest last, up to `limit`.
    pub fn recent_events(&self, limit: usize) -> Vec<Event> {
        let history = self.history.lock().expect("history poisoned");
        history
            .iter()
            .rev()
            .take(limit)
            .rev()
            .cloned()
            .collect()
    }

    /// Bus activity counters.
    pub fn metrics(&self) -> Arc<BusMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Fan one event out to every matching subscription, highest priority
    /// first, registration order within a priority. Returns the delivery
    /// count.
    async fn dispatch(&self, event: Event) -> usize {
        self.metrics.events_dispatched.fetch_add(1, Ordering::Relaxed);

        // Snapshot matching callbacks under the read lock, then release it
        // before awaiting anything.
        let mut matches: Vec<(i32, u64, String, SubscriberCallback)> = {
            let subscriptions = self
                .subscriptions
                .read()
                .expect("subscription table poisoned");
            subscriptions
                .iter()
                .filter(|s| s.event_types.contains(&event.event_type))
                .filter(|s| s.filter.as_ref().map(|f| f(&event)).unwrap_or(true))
                .map(|s| {
                    (
                        s.priority,
                        s.seq,
                        s.subscriber_id.clone(),
                        Arc::clone(&s.callback),
                    )
                })
                .collect()
        };
        matches.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

        let mut delivered = Vec::with_capacity(matches.len());
        for (_, _, subscriber_id, callback) in matches {
            match callback(event.clone()).await {
                Ok(()) => {
                    self.metrics.deliveries.fetch_add(1, Ordering::Relaxed);
                    delivered.push(subscriber_id);
                }
                Err(e) => {
                    self.metrics.subscriber_errors.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        event_id = %event.event_id,
                        event_type = %event.event_type,
                        subscriber_id = %subscriber_id,
                        error = %e,
                        "Subscriber callback failed"
                    );
                    delivered.push(subscriber_id);
                }
            }
        }

        // Record who handled the event on its history entry.
        let count = delivered.len();
        if count > 0 {
            let mut history = self.history.lock().expect("history poisoned");
            if let Some(entry) = history.iter_mut().find(|e| e.event_id == event.event_id) {
                entry.processed_by.extend(delivered);
            }
        }
        count
    }

    /// Append to the bounded history, evicting the oldest entry past the cap.
    fn remember(&self, event: Event) {
        let mut history = self.history.lock().expect("history poisoned");
        history.push_back(event);
        while history.len() > self.config.history_cap {
            history.pop_front();
            self.metrics.history_evicted.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}

// ============================================================================
// TESTS
// ============================================================================
