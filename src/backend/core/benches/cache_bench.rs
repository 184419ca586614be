//! Benchmarks for the TTL cache.
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use vigil_core::cache::CacheStore;
use vigil_core::monitor::PerformanceMonitor;

const TTL: Duration = Duration::from_secs(300);

fn filled(capacity: usize) -> CacheStore<Value> {
    let cache = CacheStore::new(capacity);
    for i in 0..capacity {
        cache.set(format!("dashboard:item:{}", i), json!({ "id": i }), TTL);
    }
    cache
}

fn bench_cache_set(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_set");
    group.throughput(Throughput::Elements(1));
    for cap in [100, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::new("overwrite", cap), &cap, |b, &capacity| {
            let cache = filled(capacity);
            b.iter(|| cache.set("dashboard:item:0", black_box(json!({ "id": 0 })), TTL));
        });
        group.bench_with_input(BenchmarkId::new("evicting_insert", cap), &cap, |b, &capacity| {
            let cache = filled(capacity);
            let mut n = capacity;
            b.iter(|| {
                n += 1;
                cache.set(format!("dashboard:item:{}", n), black_box(json!({ "id": n })), TTL);
            });
        });
    }
    group.finish();
}

fn bench_cache_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_get");
    let cache = filled(1_000);
    group.bench_function("hit", |b| b.iter(|| black_box(cache.get("dashboard:item:500"))));
    group.bench_function("miss", |b| b.iter(|| black_box(cache.get("dashboard:item:absent"))));

    let monitored = filled(1_000).with_monitor(Arc::new(PerformanceMonitor::new()));
    group.bench_function("hit_with_monitor", |b| {
        b.iter(|| black_box(monitored.get("dashboard:item:500")))
    });
    group.finish();
}

fn bench_cache_clear_prefix(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_clear_prefix");
    for cap in [100, 1_000] {
        group.bench_with_input(BenchmarkId::from_parameter(cap), &cap, |b, &capacity| {
            b.iter_batched(
                || filled(capacity),
                |cache| black_box(cache.clear(Some("dashboard:"))),
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

criterion_group!(benches, bench_cache_set, bench_cache_get, bench_cache_clear_prefix);
criterion_main!(benches);
