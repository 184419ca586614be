//! Rolling request performance.
//!
//! Keeps the last [`LATENCY_WINDOW`] request latencies plus monotonic
//! request, error and cache counters. The snapshot is recomputed on every
//! mutation so reads never scan the window.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Number of latency samples kept.
pub const LATENCY_WINDOW: usize = 100;

/// Point-in-time view of the monitor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    /// Mean latency over the window, in milliseconds
    pub response_time_avg_ms: f64,
    /// Successful requests recorded since the last reset
    pub throughput_count: u64,
    /// `errors / (requests + errors) * 100`
    pub error_rate_pct: f64,
    /// `hits / (hits + misses) * 100`
    pub cache_hit_rate_pct: f64,
}

#[derive(Default)]
struct MonitorState {
    latencies_ms: VecDeque<f64>,
    requests: u64,
    errors: u64,
    cache_hits: u64,
    cache_misses: u64,
    snapshot: MetricsSnapshot,
}

impl MonitorState {
    fn recompute(&mut self) {
        let response_time_avg_ms = if self.latencies_ms.is_empty() {
            0.0
        } else {
            self.latencies_ms.iter().sum::<f64>() / self.latencies_ms.len() as f64
        };

        self.snapshot = MetricsSnapshot {
            response_time_avg_ms,
            throughput_count: self.requests,
            error_rate_pct: percentage(self.errors, self.requests + self.errors),
            cache_hit_rate_pct: percentage(self.cache_hits, self.cache_hits + self.cache_misses),
        };
    }
}

fn percentage(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}

/// Request latency, error and cache-efficiency tracker.
#[derive(Default)]
pub struct PerformanceMonitor {
    state: Mutex<MonitorState>,
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful request that began at `start`.
    pub fn record_request(&self, start: Instant) {
        self.record_latency(start.elapsed());
    }

    /// Record a successful request that took `latency`.
    pub fn record_latency(&self, latency: Duration) {
        let mut state = self.state.lock();
        if state.latencies_ms.len() >= LATENCY_WINDOW {
            state.latencies_ms.pop_front();
        }
        state.latencies_ms.push_back(latency.as_secs_f64() * 1_000.0);
        state.requests += 1;
        state.recompute();
    }

    pub fn record_error(&self) {
        let mut state = self.state.lock();
        state.errors += 1;
        state.recompute();
    }

    pub fn record_cache_hit(&self) {
        let mut state = self.state.lock();
        state.cache_hits += 1;
        state.recompute();
    }

    pub fn record_cache_miss(&self) {
        let mut state = self.state.lock();
        state.cache_misses += 1;
        state.recompute();
    }

    pub fn get_metrics(&self) -> MetricsSnapshot {
        self.state.lock().snapshot
    }

    /// Latency samples in the window, oldest first, in milliseconds.
    pub fn recent_latencies(&self) -> Vec<f64> {
        self.state.lock().latencies_ms.iter().copied().collect()
    }

    /// Zero every counter and clear the window in one step.
    pub fn reset(&self) {
        *self.state.lock() = MonitorState::default();
        debug!("Performance monitor reset");
    }
}

impl std::fmt::Debug for PerformanceMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PerformanceMonitor")
            .field("snapshot", &self.get_metrics())
            .finish()
    }
}
