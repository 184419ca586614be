//! In-process publish/subscribe bus with bounded history.
//!
//! Delivery is synchronous: `publish` returns after every matching handler
//! has run. The subscriber list is snapshotted after the history push and no
//! lock is held while handlers run, so handlers may publish, subscribe or
//! unsubscribe without disturbing the dispatch in progress.

use chrono::{DateTime, Utc};
use metrics::{counter, gauge};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, error};

use super::event::{Event, EventId, EventInput, EventKind, Severity};

/// Default number of events retained in history.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1_000;

/// Source assigned to events published without one.
pub const DEFAULT_SOURCE: &str = "system";

type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

/// What a subscriber listens to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topic {
    Kind(EventKind),
    /// Every event (`"*"`)
    All,
}

impl Topic {
    pub fn matches(&self, kind: &EventKind) -> bool {
        match self {
            Self::All => true,
            Self::Kind(k) => k == kind,
        }
    }
}

impl From<EventKind> for Topic {
    fn from(kind: EventKind) -> Self {
        Self::Kind(kind)
    }
}

impl From<&str> for Topic {
    fn from(name: &str) -> Self {
        match name {
            "*" => Self::All,
            other => Self::Kind(EventKind::from(other)),
        }
    }
}

/// History query. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub kind: Option<EventKind>,
    pub severity: Option<Severity>,
    pub source: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl HistoryFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kind(mut self, kind: impl Into<EventKind>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Inclusive time range; either end may be open.
    pub fn between(mut self, since: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> Self {
        self.since = since;
        self.until = until;
        self
    }

    fn matches(&self, event: &Event) -> bool {
        self.kind.as_ref().map_or(true, |k| &event.kind == k)
            && self.severity.map_or(true, |s| event.severity == s)
            && self.source.as_deref().map_or(true, |s| event.source == s)
            && self.since.map_or(true, |t| event.timestamp >= t)
            && self.until.map_or(true, |t| event.timestamp <= t)
    }
}

/// Counters describing bus activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BusStats {
    pub published: u64,
    pub delivered: u64,
    pub handler_failures: u64,
    pub history_len: usize,
    pub subscriber_count: usize,
}

struct SubscriberEntry {
    id: u64,
    topic: Topic,
    handler: Handler,
}

struct BusState {
    history: VecDeque<Arc<Event>>,
    subscribers: Vec<SubscriberEntry>,
    next_subscriber_id: u64,
}

struct BusInner {
    capacity: usize,
    state: Mutex<BusState>,
    published: AtomicU64,
    delivered: AtomicU64,
    handler_failures: AtomicU64,
}

impl BusInner {
    fn remove_subscriber(&self, id: u64) -> bool {
        let mut state = self.state.lock();
        let before = state.subscribers.len();
        state.subscribers.retain(|s| s.id != id);
        let removed = state.subscribers.len() != before;
        gauge!("vigil_event_subscribers").set(state.subscribers.len() as f64);
        removed
    }
}

/// Typed event bus shared by every component of the runtime.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    /// Create a bus retaining at most `capacity` events (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(BusInner {
                capacity,
                state: Mutex::new(BusState {
                    history: VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY_CAPACITY)),
                    subscribers: Vec::new(),
                    next_subscriber_id: 0,
                }),
                published: AtomicU64::new(0),
                delivered: AtomicU64::new(0),
                handler_failures: AtomicU64::new(0),
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Publishing
    // ─────────────────────────────────────────────────────────────────────────

    /// Stamp `input`, append it to history and deliver it.
    ///
    /// Handlers run on the caller's thread in registration order. A handler
    /// that panics is logged and skipped; the remaining handlers still run.
    pub fn publish(&self, input: EventInput) -> EventId {
        let event = Arc::new(Event::stamp(input, DEFAULT_SOURCE));

        let handlers: Vec<Handler> = {
            let mut state = self.inner.state.lock();
            if state.history.len() >= self.inner.capacity {
                state.history.pop_front();
            }
            state.history.push_back(event.clone());
            gauge!("vigil_event_history_size").set(state.history.len() as f64);

            state
                .subscribers
                .iter()
                .filter(|s| s.topic.matches(&event.kind))
                .map(|s| s.handler.clone())
                .collect()
        };

        self.inner.published.fetch_add(1, Ordering::Relaxed);
        counter!("vigil_events_published_total", "kind" => event.kind.to_string()).increment(1);

        debug!(
            event_id = %event.id,
            kind = %event.kind,
            severity = ?event.severity,
            handlers = handlers.len(),
            "Publishing event"
        );

        for handler in handlers {
            self.dispatch(&handler, &event);
        }

        event.id
    }

    fn dispatch(&self, handler: &Handler, event: &Event) {
        match catch_unwind(AssertUnwindSafe(|| handler(event))) {
            Ok(()) => {
                self.inner.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Err(panic) => {
                self.inner.handler_failures.fetch_add(1, Ordering::Relaxed);
                counter!("vigil_event_handler_failures_total", "kind" => event.kind.to_string())
                    .increment(1);
                error!(
                    event_id = %event.id,
                    kind = %event.kind,
                    panic = %panic_message(panic.as_ref()),
                    "Event handler panicked"
                );
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Subscriptions
    // ─────────────────────────────────────────────────────────────────────────

    /// Register `handler` for `topic`.
    ///
    /// The handler is removed when the returned [`Subscription`] is dropped
    /// or unsubscribed. Events published before this call are not replayed.
    pub fn subscribe<F>(&self, topic: impl Into<Topic>, handler: F) -> Subscription
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let topic = topic.into();
        let mut state = self.inner.state.lock();
        let id = state.next_subscriber_id;
        state.next_subscriber_id += 1;

        debug!(subscriber_id = id, topic = ?topic, "Subscriber registered");
        state.subscribers.push(SubscriberEntry {
            id,
            topic,
            handler: Arc::new(handler),
        });
        gauge!("vigil_event_subscribers").set(state.subscribers.len() as f64);

        Subscription {
            id,
            bus: Arc::downgrade(&self.inner),
            active: true,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.state.lock().subscribers.len()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // History
    // ─────────────────────────────────────────────────────────────────────────

    /// Matching events, most recent first, at most `limit` of them.
    pub fn history(&self, filter: &HistoryFilter, limit: Option<usize>) -> Vec<Arc<Event>> {
        let state = self.inner.state.lock();
        state
            .history
            .iter()
            .rev()
            .filter(|e| filter.matches(e))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    /// The `limit` most recent events.
    pub fn recent(&self, limit: usize) -> Vec<Arc<Event>> {
        self.history(&HistoryFilter::default(), Some(limit))
    }

    pub fn history_len(&self) -> usize {
        self.inner.state.lock().history.len()
    }

    /// Drop all retained events. Subscribers are kept.
    pub fn clear_history(&self) {
        let mut state = self.inner.state.lock();
        state.history.clear();
        gauge!("vigil_event_history_size").set(0.0);
    }

    pub fn stats(&self) -> BusStats {
        let state = self.inner.state.lock();
        BusStats {
            published: self.inner.published.load(Ordering::Relaxed),
            delivered: self.inner.delivered.load(Ordering::Relaxed),
            handler_failures: self.inner.handler_failures.load(Ordering::Relaxed),
            history_len: state.history.len(),
            subscriber_count: state.subscribers.len(),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("EventBus")
            .field("capacity", &self.inner.capacity)
            .field("history_len", &stats.history_len)
            .field("subscriber_count", &stats.subscriber_count)
            .finish()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Handle to a registered handler.
#[must_use = "dropping a Subscription unregisters its handler"]
pub struct Subscription {
    id: u64,
    bus: Weak<BusInner>,
    active: bool,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Remove the handler now.
    pub fn unsubscribe(mut self) {
        self.remove();
    }

    /// Keep the handler registered for the lifetime of the bus.
    pub fn detach(mut self) {
        self.active = false;
    }

    fn remove(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(bus) = self.bus.upgrade() {
            if bus.remove_subscriber(self.id) {
                debug!(subscriber_id = self.id, "Subscriber removed");
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.remove();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.active)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;
    use serde_json::json;

    fn input(kind: EventKind) -> EventInput {
        EventInput::new(kind, json!({}))
    }

    #[test]
    fn test_history_bounded_and_evicts_oldest() {
        let bus = EventBus::new(3);
        let ids: Vec<EventId> = (0..5)
            .map(|i| bus.publish(EventInput::new(EventKind::Notification, json!({ "n": i }))))
            .collect();

        assert_eq!(bus.history_len(), 3);
        let retained: Vec<EventId> = bus.recent(10).iter().map(|e| e.id).collect();
        assert_eq!(retained, vec![ids[4], ids[3], ids[2]]);
    }

    #[test]
    fn test_kind_and_wildcard_in_registration_order() {
        let bus = EventBus::new(10);
        let calls = Arc::new(PlMutex::new(Vec::new()));

        let c = calls.clone();
        let _a = bus.subscribe(Topic::All, move |_| c.lock().push("all-1"));
        let c = calls.clone();
        let _b = bus.subscribe(EventKind::RiskDetected, move |_| c.lock().push("risk"));
        let c = calls.clone();
        let _c = bus.subscribe(EventKind::Insight, move |_| c.lock().push("insight"));
        let c = calls.clone();
        let _d = bus.subscribe("*", move |_| c.lock().push("all-2"));

        bus.publish(input(EventKind::RiskDetected));
        assert_eq!(*calls.lock(), vec!["all-1", "risk", "all-2"]);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let bus = EventBus::new(10);
        let count = Arc::new(AtomicU64::new(0));

        let c = count.clone();
        let sub = bus.subscribe(Topic::All, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        bus.publish(input(EventKind::Insight));
        drop(sub);
        bus.publish(input(EventKind::Insight));

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_detach_keeps_handler() {
        let bus = EventBus::new(10);
        let count = Arc::new(AtomicU64::new(0));

        let c = count.clone();
        bus.subscribe(Topic::All, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .detach();

        bus.publish(input(EventKind::Insight));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(bus.subscriber_count(), 1);
    }

    #[test]
    fn test_panicking_handler_is_isolated() {
        let bus = EventBus::new(10);
        let reached = Arc::new(AtomicU64::new(0));

        let _bad = bus.subscribe(Topic::All, |_| panic!("handler failure"));
        let r = reached.clone();
        let _good = bus.subscribe(Topic::All, move |_| {
            r.fetch_add(1, Ordering::SeqCst);
        });

        bus.publish(input(EventKind::SystemEvent));

        assert_eq!(reached.load(Ordering::SeqCst), 1);
        let stats = bus.stats();
        assert_eq!(stats.handler_failures, 1);
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.history_len, 1);
    }

    #[test]
    fn test_history_filters() {
        let bus = EventBus::new(10);
        bus.publish(input(EventKind::RiskDetected).with_severity(Severity::High));
        bus.publish(input(EventKind::RiskDetected).with_source("websocket"));
        bus.publish(input(EventKind::Insight).with_severity(Severity::High));

        assert_eq!(bus.history(&HistoryFilter::new().kind(EventKind::RiskDetected), None).len(), 2);
        assert_eq!(bus.history(&HistoryFilter::new().severity(Severity::High), None).len(), 2);
        assert_eq!(bus.history(&HistoryFilter::new().source("websocket"), None).len(), 1);
        assert_eq!(bus.history(&HistoryFilter::new().source("system"), Some(1)).len(), 1);

        let future = Utc::now() + chrono::Duration::hours(1);
        assert!(bus
            .history(&HistoryFilter::new().between(Some(future), None), None)
            .is_empty());
    }

    #[test]
    fn test_clear_history_keeps_subscribers() {
        let bus = EventBus::new(10);
        let _sub = bus.subscribe(Topic::All, |_| {});
        bus.publish(input(EventKind::Notification));
        bus.clear_history();

        assert_eq!(bus.history_len(), 0);
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(bus.stats().published, 1);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let bus = EventBus::new(0);
        bus.publish(input(EventKind::Notification));
        bus.publish(input(EventKind::Notification));
        assert_eq!(bus.capacity(), 1);
        assert_eq!(bus.history_len(), 1);
    }
}
