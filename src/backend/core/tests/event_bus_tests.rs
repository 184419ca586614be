//! Integration tests for the event bus.
//!
//! Tests cover:
//! - Topic routing (kind and wildcard)
//! - Registration-order delivery
//! - Bounded history and filtering
//! - Handler panics
//! - Reentrant publish / subscribe / unsubscribe from inside a handler

use parking_lot::Mutex;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use vigil_core::events::{
    Event, EventBus, EventInput, EventKind, HistoryFilter, Severity, Subscription, Topic,
};

type Handler = Box<dyn Fn(&Event) + Send + Sync>;

/// Shared log plus a factory of handlers appending `label:kind` to it.
fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Handler) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    let make = move |label: &str| -> Handler {
        let sink = sink.clone();
        let label = label.to_string();
        Box::new(move |event: &Event| sink.lock().push(format!("{}:{}", label, event.kind)))
    };
    (log, make)
}

// ============================================================================
// Routing
// ============================================================================

#[test]
fn test_kind_and_wildcard_subscribers_in_registration_order() {
    let bus = EventBus::new(10);
    let (log, handler) = recorder();

    let _a = bus.subscribe(EventKind::RiskDetected, handler("a"));
    let _all = bus.subscribe(Topic::All, handler("all"));
    let _b = bus.subscribe(EventKind::RiskDetected, handler("b"));
    let _other = bus.subscribe(EventKind::PolicyChanged, handler("other"));

    bus.publish(EventInput::new(EventKind::RiskDetected, json!({ "risk": "R-7" })));

    assert_eq!(
        *log.lock(),
        vec!["a:risk_detected", "all:risk_detected", "b:risk_detected"]
    );
}

#[test]
fn test_string_topics() {
    let bus = EventBus::new(10);
    let (log, handler) = recorder();

    let _star = bus.subscribe("*", handler("star"));
    let _named = bus.subscribe("gap_identified", handler("named"));

    bus.publish(EventInput::new("gap_identified", json!({})));
    bus.publish(EventInput::new("vendor_onboarded", json!({})));

    assert_eq!(
        *log.lock(),
        vec![
            "star:gap_identified",
            "named:gap_identified",
            "star:vendor_onboarded"
        ]
    );
}

#[test]
fn test_no_replay_for_late_subscribers() {
    let bus = EventBus::new(10);
    bus.publish(EventInput::new(EventKind::ControlUpdated, json!({})));

    let (log, handler) = recorder();
    let _late = bus.subscribe(Topic::All, handler("late"));

    assert!(log.lock().is_empty());
    assert_eq!(bus.history_len(), 1);
}

#[test]
fn test_dropping_subscription_unregisters() {
    let bus = EventBus::new(10);
    let count = Arc::new(AtomicUsize::new(0));

    let c = count.clone();
    let sub = bus.subscribe(Topic::All, move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });
    bus.publish(EventInput::new(EventKind::SystemEvent, json!({})));
    drop(sub);
    bus.publish(EventInput::new(EventKind::SystemEvent, json!({})));

    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(bus.subscriber_count(), 0);
}

#[test]
fn test_detached_subscription_stays_registered() {
    let bus = EventBus::new(10);
    let count = Arc::new(AtomicUsize::new(0));

    let c = count.clone();
    bus.subscribe(Topic::All, move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    })
    .detach();

    bus.publish(EventInput::new(EventKind::Insight, json!({})));
    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(bus.subscriber_count(), 1);
}

// ============================================================================
// History
// ============================================================================

#[test]
fn test_history_bounded_and_most_recent_first() {
    let bus = EventBus::new(3);
    for i in 0..5 {
        bus.publish(EventInput::new(EventKind::WorkflowUpdate, json!({ "step": i })));
    }

    let history = bus.recent(10);
    assert_eq!(history.len(), 3);
    let steps: Vec<i64> = history
        .iter()
        .map(|e| e.payload["step"].as_i64().unwrap())
        .collect();
    assert_eq!(steps, vec![4, 3, 2]);
}

#[test]
fn test_history_filters() {
    let bus = EventBus::new(100);
    bus.publish(EventInput::new(EventKind::RiskDetected, json!({})).with_severity(Severity::Critical));
    bus.publish(EventInput::new(EventKind::RiskDetected, json!({})).with_severity(Severity::Low));
    bus.publish(
        EventInput::new(EventKind::GapIdentified, json!({}))
            .with_severity(Severity::High)
            .with_source("scanner"),
    );

    let risks = bus.history(&HistoryFilter::new().kind(EventKind::RiskDetected), None);
    assert_eq!(risks.len(), 2);

    let critical = bus.history(&HistoryFilter::new().severity(Severity::Critical), None);
    assert_eq!(critical.len(), 1);
    assert_eq!(critical[0].kind, EventKind::RiskDetected);

    let scanner = bus.history(&HistoryFilter::new().source("scanner"), None);
    assert_eq!(scanner.len(), 1);

    let limited = bus.history(&HistoryFilter::new(), Some(1));
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].kind, EventKind::GapIdentified);
}

#[test]
fn test_published_event_fields() {
    let bus = EventBus::new(10);
    let id = bus.publish(
        EventInput::new(EventKind::ControlUpdated, json!({ "control": "AC-2" }))
            .with_actor("user-9")
            .with_entity("control", "AC-2")
            .with_tag("soc2"),
    );

    let event = bus.recent(1).remove(0);
    assert_eq!(event.id, id);
    assert_eq!(event.source, "system");
    assert_eq!(event.severity, Severity::Medium);
    assert_eq!(event.actor_id.as_deref(), Some("user-9"));
    assert_eq!(event.entity_id.as_deref(), Some("AC-2"));
    assert!(event.has_tag("soc2"));
    assert!(!event.acknowledged);
}

// ============================================================================
// Failure isolation
// ============================================================================

#[test]
fn test_panicking_handler_does_not_reach_siblings() {
    let bus = EventBus::new(10);
    let (log, handler) = recorder();

    let _before = bus.subscribe(Topic::All, handler("before"));
    let _boom = bus.subscribe(Topic::All, |_| panic!("handler exploded"));
    let _after = bus.subscribe(Topic::All, handler("after"));

    bus.publish(EventInput::new(EventKind::Notification, json!({})));

    assert_eq!(*log.lock(), vec!["before:notification", "after:notification"]);
    let stats = bus.stats();
    assert_eq!(stats.handler_failures, 1);
    assert_eq!(stats.delivered, 2);
    assert_eq!(stats.published, 1);
}

// ============================================================================
// Reentrancy
// ============================================================================

#[test]
fn test_handler_may_publish() {
    let bus = EventBus::new(10);
    let (log, handler) = recorder();

    let relay = bus.clone();
    let _relay = bus.subscribe(EventKind::RiskDetected, move |_| {
        relay.publish(EventInput::new(EventKind::Notification, json!({ "relayed": true })));
    });
    let _sink = bus.subscribe(EventKind::Notification, handler("sink"));

    bus.publish(EventInput::new(EventKind::RiskDetected, json!({})));

    assert_eq!(*log.lock(), vec!["sink:notification"]);
    let kinds: Vec<EventKind> = bus.recent(10).iter().map(|e| e.kind.clone()).collect();
    assert_eq!(kinds, vec![EventKind::Notification, EventKind::RiskDetected]);
}

#[test]
fn test_handler_registered_during_dispatch_misses_current_event() {
    let bus = EventBus::new(10);
    let (log, handler) = recorder();
    let held: Arc<Mutex<Vec<Subscription>>> = Arc::new(Mutex::new(Vec::new()));

    let registrar = bus.clone();
    let slot = held.clone();
    let sink_log = log.clone();
    let _registrar = bus.subscribe(EventKind::PolicyChanged, move |_| {
        let sink_log = sink_log.clone();
        let sub = registrar.subscribe(EventKind::PolicyChanged, move |event| {
            sink_log.lock().push(format!("late:{}", event.kind));
        });
        slot.lock().push(sub);
    });
    let _existing = bus.subscribe(EventKind::PolicyChanged, handler("existing"));

    bus.publish(EventInput::new(EventKind::PolicyChanged, json!({ "n": 1 })));
    assert_eq!(*log.lock(), vec!["existing:policy_changed"]);

    bus.publish(EventInput::new(EventKind::PolicyChanged, json!({ "n": 2 })));
    let entries = log.lock().clone();
    assert_eq!(entries.iter().filter(|e| e.starts_with("late:")).count(), 1);
    assert_eq!(held.lock().len(), 2);
}

#[test]
fn test_handler_may_unsubscribe_itself() {
    let bus = EventBus::new(10);
    let count = Arc::new(AtomicUsize::new(0));
    let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

    let c = count.clone();
    let own = slot.clone();
    let sub = bus.subscribe(Topic::All, move |_| {
        c.fetch_add(1, Ordering::SeqCst);
        if let Some(sub) = own.lock().take() {
            sub.unsubscribe();
        }
    });
    *slot.lock() = Some(sub);

    bus.publish(EventInput::new(EventKind::UserAction, json!({})));
    bus.publish(EventInput::new(EventKind::UserAction, json!({})));

    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert_eq!(bus.subscriber_count(), 0);
}
