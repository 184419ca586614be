//! Benchmarks for event publishing and history queries.
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use vigil_core::events::{EventBus, EventInput, EventKind, HistoryFilter, Severity, Subscription, Topic};

fn bench_publish(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_publish");
    group.throughput(Throughput::Elements(1));

    for subscribers in [0usize, 1, 10, 100] {
        group.bench_with_input(
            BenchmarkId::new("subscribers", subscribers),
            &subscribers,
            |b, &n| {
                let bus = EventBus::new(1_000);
                let counter = Arc::new(AtomicU64::new(0));
                let _subs: Vec<Subscription> = (0..n)
                    .map(|_| {
                        let counter = counter.clone();
                        bus.subscribe(EventKind::RiskDetected, move |_| {
                            counter.fetch_add(1, Ordering::Relaxed);
                        })
                    })
                    .collect();

                b.iter(|| {
                    black_box(bus.publish(EventInput::new(
                        EventKind::RiskDetected,
                        json!({ "risk": "R-1", "score": 42 }),
                    )))
                });
            },
        );
    }

    group.bench_function("wildcard_and_unmatched", |b| {
        let bus = EventBus::new(1_000);
        let _all = bus.subscribe(Topic::All, |e| {
            black_box(&e.id);
        });
        let _other = bus.subscribe(EventKind::PolicyChanged, |e| {
            black_box(&e.id);
        });
        b.iter(|| black_box(bus.publish(EventInput::new(EventKind::ControlUpdated, json!({})))));
    });

    group.finish();
}

fn bench_history(c: &mut Criterion) {
    let mut group = c.benchmark_group("event_history");
    let bus = EventBus::new(1_000);
    let kinds = [EventKind::RiskDetected, EventKind::GapIdentified, EventKind::UserAction];
    let severities = [Severity::Low, Severity::Medium, Severity::High, Severity::Critical];
    for i in 0..1_000 {
        bus.publish(
            EventInput::new(kinds[i % kinds.len()].clone(), json!({ "n": i }))
                .with_severity(severities[i % severities.len()]),
        );
    }

    group.bench_function("recent_50", |b| b.iter(|| black_box(bus.recent(50))));
    group.bench_function("by_kind", |b| {
        let filter = HistoryFilter::new().kind(EventKind::GapIdentified);
        b.iter(|| black_box(bus.history(&filter, None)))
    });
    group.bench_function("by_kind_and_severity_limited", |b| {
        let filter = HistoryFilter::new()
            .kind(EventKind::RiskDetected)
            .severity(Severity::Critical);
        b.iter(|| black_box(bus.history(&filter, Some(10))))
    });
    group.finish();
}

criterion_group!(benches, bench_publish, bench_history);
criterion_main!(benches);
