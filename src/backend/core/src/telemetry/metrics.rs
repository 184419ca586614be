//! Prometheus metrics for the bus, the cache, the connection and actions.
//!
//! Components record through the `metrics` facade unconditionally; nothing
//! is exported unless a host installs the Prometheus recorder with
//! [`init_metrics`].
//!
//! # Example
//!
//! ```rust,no_run
//! use vigil_core::telemetry::metrics::{ActionMetrics, OperationTimer};
//!
//! let timer = OperationTimer::start("dashboard_refresh");
//! // ... work ...
//! timer.finish();
//!
//! ActionMetrics::record("run_assessment", 0.120, true);
//! ```

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Metrics configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    /// Whether the Prometheus recorder is installed
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,

    /// Histogram buckets for durations (in seconds)
    #[serde(default = "default_duration_buckets")]
    pub duration_buckets: Vec<f64>,

    /// Global labels to add to all metrics
    #[serde(default)]
    pub global_labels: HashMap<String, String>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            duration_buckets: default_duration_buckets(),
            global_labels: HashMap::new(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    false
}

fn default_duration_buckets() -> Vec<f64> {
    vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
}

/// Handle to the installed recorder, if any.
pub struct MetricsRegistry {
    prometheus_handle: Option<PrometheusHandle>,
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("prometheus_handle", &self.prometheus_handle.is_some())
            .finish()
    }
}

impl MetricsRegistry {
    /// A registry with no recorder behind it.
    pub fn disabled() -> Self {
        Self {
            prometheus_handle: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.prometheus_handle.is_some()
    }

    /// Render all metrics in Prometheus text format.
    ///
    /// Empty when no recorder is installed. Hosts serve this wherever their
    /// scrape endpoint lives.
    pub fn render(&self) -> String {
        self.prometheus_handle
            .as_ref()
            .map(|h| h.render())
            .unwrap_or_default()
    }
}

/// Install the Prometheus recorder.
///
/// # Errors
///
/// Returns an error if the buckets are invalid or a global recorder is
/// already installed.
pub fn init_metrics(config: &MetricsConfig, service_name: &str) -> anyhow::Result<MetricsRegistry> {
    if !config.enabled {
        return Ok(MetricsRegistry::disabled());
    }

    let mut builder = PrometheusBuilder::new().add_global_label("service", service_name);

    for (key, value) in &config.global_labels {
        builder = builder.add_global_label(key, value);
    }

    builder = builder.set_buckets(&config.duration_buckets)?;

    let handle = builder.install_recorder()?;

    register_metric_descriptions();

    tracing::info!(service_name = %service_name, "Metrics initialized");

    Ok(MetricsRegistry {
        prometheus_handle: Some(handle),
    })
}

fn register_metric_descriptions() {
    // Event bus
    describe_counter!("vigil_events_published_total", "Events published on the bus");
    describe_counter!(
        "vigil_event_handler_failures_total",
        "Subscriber handlers that panicked during delivery"
    );
    describe_gauge!("vigil_event_subscribers", "Registered bus subscribers");
    describe_gauge!("vigil_event_history_size", "Events retained in bus history");

    // Cache
    describe_counter!("vigil_cache_hits_total", "Cache lookups that returned a live entry");
    describe_counter!("vigil_cache_misses_total", "Cache lookups that found nothing live");
    describe_counter!("vigil_cache_evictions_total", "Entries evicted at capacity");
    describe_counter!("vigil_cache_expirations_total", "Entries dropped on expired lookup");
    describe_gauge!("vigil_cache_entries", "Entries currently stored");

    // Connection
    describe_gauge!(
        "vigil_connection_state",
        "Connection state (0=disconnected, 1=connecting, 2=connected, 3=reconnecting, 4=closed)"
    );
    describe_counter!("vigil_connection_attempts_total", "Transport open attempts");
    describe_counter!("vigil_connection_failures_total", "Transport failures");
    describe_counter!("vigil_frames_received_total", "Inbound frames routed by type");
    describe_counter!("vigil_frames_dropped_total", "Inbound frames dropped");
    describe_counter!("vigil_frames_sent_total", "Outbound frames written");

    // Actions and refreshes
    describe_counter!("vigil_actions_total", "Executed dashboard actions");
    describe_histogram!("vigil_action_duration_seconds", "Dashboard action latency");
    describe_histogram!("vigil_operation_duration_seconds", "Internal operation latency");
    describe_counter!("vigil_config_updates_total", "Configuration update attempts");

    // Errors
    describe_counter!("vigil_errors_total", "Errors constructed, by code");
}

/// Connection lifecycle metrics.
pub struct ConnectionMetrics;

impl ConnectionMetrics {
    pub fn record_state(code: u8) {
        gauge!("vigil_connection_state").set(f64::from(code));
    }

    pub fn record_attempt() {
        counter!("vigil_connection_attempts_total").increment(1);
    }

    pub fn record_failure(reason: &'static str) {
        counter!("vigil_connection_failures_total", "reason" => reason).increment(1);
    }

    pub fn record_frame(kind: &'static str) {
        counter!("vigil_frames_received_total", "type" => kind).increment(1);
    }

    pub fn record_dropped(reason: &'static str) {
        counter!("vigil_frames_dropped_total", "reason" => reason).increment(1);
    }

    pub fn record_sent() {
        counter!("vigil_frames_sent_total").increment(1);
    }
}

/// Dashboard action metrics.
pub struct ActionMetrics;

impl ActionMetrics {
    /// Record one executed action.
    pub fn record(action: &str, duration_seconds: f64, success: bool) {
        let outcome = if success { "success" } else { "failure" };

        counter!(
            "vigil_actions_total",
            "action" => action.to_string(),
            "outcome" => outcome,
        )
        .increment(1);

        histogram!(
            "vigil_action_duration_seconds",
            "action" => action.to_string(),
        )
        .record(duration_seconds);
    }

    /// Record one configuration update attempt.
    pub fn record_config_update(accepted: bool) {
        let outcome = if accepted { "accepted" } else { "rejected" };
        counter!("vigil_config_updates_total", "outcome" => outcome).increment(1);
    }
}

/// Times an operation and records it on [`finish`](Self::finish).
pub struct OperationTimer {
    start: Instant,
    operation_name: &'static str,
}

impl OperationTimer {
    pub fn start(operation_name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation_name,
        }
    }

    /// Elapsed time without recording.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Record to `vigil_operation_duration_seconds` and return the duration.
    pub fn finish(self) -> Duration {
        let duration = self.start.elapsed();

        histogram!(
            "vigil_operation_duration_seconds",
            "operation" => self.operation_name,
        )
        .record(duration.as_secs_f64());

        duration
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_config_defaults() {
        let config = MetricsConfig::default();
        assert!(!config.enabled);
        assert!(!config.duration_buckets.is_empty());
        assert!(config.global_labels.is_empty());
    }

    #[test]
    fn test_disabled_registry_renders_nothing() {
        let registry = init_metrics(&MetricsConfig::default(), "vigil-test").unwrap();
        assert!(!registry.is_enabled());
        assert!(registry.render().is_empty());
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        ConnectionMetrics::record_state(2);
        ConnectionMetrics::record_frame("notification");
        ActionMetrics::record("run_assessment", 0.05, true);
        ActionMetrics::record_config_update(false);
    }

    #[test]
    fn test_operation_timer() {
        let timer = OperationTimer::start("test_operation");
        std::thread::sleep(Duration::from_millis(10));
        let duration = timer.finish();
        assert!(duration.as_millis() >= 10);
    }
}
