//! Dashboard state coordination.
//!
//! [`StateCoordinator`] owns one start/stop cycle at a time: the snapshot
//! load, the periodic refresh task and the real-time connection. The bus,
//! cache and monitor live in [`SharedServices`] and survive `stop()`.
//!
//! ```text
//!   Backend ──fetch──► snapshot ──► CacheStore ("dashboard:snapshot")
//!      ▲                  ▲
//!   actions          live updates ◄── ConnectionManager ──► EventBus
//! ```
//!
//! Every start gets a new generation number. Work that finishes after its
//! generation was stopped is discarded with `CoordinatorStopped`.

pub mod services;
pub mod snapshot;

pub use services::{CoordinatorOptions, SharedServices};
pub use snapshot::{DashboardSnapshot, DASHBOARD_CACHE_PREFIX, MAX_LIVE_ITEMS, SNAPSHOT_CACHE_KEY};

use parking_lot::{Mutex, RwLock};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::api::{ActionResult, Backend, DashboardMetrics, HttpBackend, Insight, Notification};
use crate::config::{Config, ConfigManager};
use crate::connection::{
    ConnectionCallbacks, ConnectionManager, ConnectionState, Transport, WsTransport, WEBSOCKET_SOURCE,
};
use crate::error::{ErrorCode, Result, VigilError};
use crate::events::{EventInput, EventKind, Severity};
use crate::monitor::MetricsSnapshot;
use crate::settings::Settings;
use crate::telemetry::{ActionMetrics, OperationTimer};

/// Source recorded on events the coordinator publishes itself.
pub const COORDINATOR_SOURCE: &str = "coordinator";

const MIN_REFRESH_PERIOD: Duration = Duration::from_secs(1);

// ═══════════════════════════════════════════════════════════════════════════════
// Internal state
// ═══════════════════════════════════════════════════════════════════════════════

/// Resources owned by one start/stop cycle.
struct Run {
    generation: u64,
    cancel: CancellationToken,
    connection: Option<Arc<ConnectionManager>>,
    refresh: Option<(Duration, JoinHandle<()>)>,
}

struct Inner {
    services: Arc<SharedServices>,
    backend: Arc<dyn Backend>,
    transport: Arc<dyn Transport>,
    config: ConfigManager,
    options: CoordinatorOptions,
    generations: AtomicU64,
    snapshot: RwLock<Option<DashboardSnapshot>>,
    /// `Some` while started; this is the liveness flag.
    run: Mutex<Option<Run>>,
}

impl Inner {
    fn current_generation(&self) -> Result<u64> {
        self.run
            .lock()
            .as_ref()
            .map(|run| run.generation)
            .ok_or_else(VigilError::coordinator_stopped)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.run
            .lock()
            .as_ref()
            .map_or(false, |run| run.generation == generation)
    }

    fn refresh_period(&self, config: &Config) -> Duration {
        self.options
            .refresh_interval
            .unwrap_or_else(|| Duration::from_secs(config.monitoring.monitoring_interval))
            .max(MIN_REFRESH_PERIOD)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Snapshot loading
    // ─────────────────────────────────────────────────────────────────────────

    /// Serve the snapshot from cache unless `force`, otherwise fetch it.
    async fn load_snapshot(&self, generation: u64, force: bool) -> Result<DashboardSnapshot> {
        if !force {
            match self.services.cache.get_json::<DashboardSnapshot>(SNAPSHOT_CACHE_KEY) {
                Ok(Some(snapshot)) => {
                    debug!("Serving dashboard snapshot from cache");
                    *self.snapshot.write() = Some(snapshot.clone());
                    return Ok(snapshot);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, "Discarding unreadable cached snapshot");
                    self.services.cache.remove(SNAPSHOT_CACHE_KEY);
                }
            }
        }

        let fetched = self.fetch_snapshot().await;
        if !self.is_current(generation) {
            debug!(generation, "Discarding snapshot fetched after stop");
            return Err(VigilError::coordinator_stopped());
        }
        let snapshot = fetched?;

        if let Err(e) = self
            .services
            .cache
            .set_json(SNAPSHOT_CACHE_KEY, &snapshot, self.options.snapshot_ttl)
        {
            warn!(error = %e, "Could not cache dashboard snapshot");
        }
        *self.snapshot.write() = Some(snapshot.clone());
        Ok(snapshot)
    }

    async fn fetch_snapshot(&self) -> Result<DashboardSnapshot> {
        let timer = OperationTimer::start("dashboard_refresh");
        let started = Instant::now();
        let backend = &self.backend;

        let fetched = futures::try_join!(
            backend.fetch_status(),
            backend.fetch_metrics(),
            backend.fetch_events(),
            backend.fetch_notifications(),
            backend.fetch_insights(),
        );
        let elapsed = timer.finish();

        match fetched {
            Ok((status, metrics, events, notifications, insights)) => {
                self.services.monitor.record_request(started);
                debug!(
                    elapsed_ms = elapsed.as_millis() as u64,
                    events = events.len(),
                    notifications = notifications.len(),
                    insights = insights.len(),
                    "Fetched dashboard snapshot"
                );
                Ok(DashboardSnapshot::new(status, metrics, events, notifications, insights))
            }
            Err(e) => {
                self.services.monitor.record_error();
                Err(e)
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Live updates from the connection
    // ─────────────────────────────────────────────────────────────────────────

    /// Apply `f` to the live snapshot and drop the cached copy it supersedes.
    fn update_live(&self, f: impl FnOnce(&mut DashboardSnapshot)) {
        let updated = match self.snapshot.write().as_mut() {
            Some(snapshot) => {
                f(snapshot);
                true
            }
            None => false,
        };
        if updated {
            self.services.cache.remove(SNAPSHOT_CACHE_KEY);
        }
    }

    /// Publish a live frame to the bus, whether or not the snapshot could
    /// use it.
    fn publish_live(&self, kind: EventKind, payload: Value, severity: Severity) {
        let entity_id = payload.get("id").and_then(Value::as_str).map(str::to_string);
        let mut input = EventInput::new(kind.clone(), payload)
            .with_severity(severity)
            .with_source(WEBSOCKET_SOURCE);
        if let Some(id) = entity_id {
            input = input.with_entity(kind.as_str(), id);
        }
        self.services.bus.publish(input);
    }

    fn apply_metrics(&self, payload: Value) {
        match serde_json::from_value::<DashboardMetrics>(payload.clone()) {
            Ok(metrics) => self.update_live(|s| s.metrics = metrics),
            Err(e) => warn!(error = %e, "Metrics update not applied to snapshot"),
        }
        self.publish_live(EventKind::MetricsUpdate, payload, Severity::Low);
    }

    fn apply_notification(&self, payload: Value) {
        let severity = match serde_json::from_value::<Notification>(payload.clone()) {
            Ok(notification) => {
                let severity = notification.severity;
                self.update_live(|s| s.push_notification(notification));
                severity
            }
            Err(e) => {
                warn!(error = %e, "Notification not applied to snapshot");
                payload
                    .get("severity")
                    .and_then(|v| Severity::deserialize(v).ok())
                    .unwrap_or_default()
            }
        };
        self.publish_live(EventKind::Notification, payload, severity);
    }

    fn apply_insight(&self, payload: Value) {
        match serde_json::from_value::<Insight>(payload.clone()) {
            Ok(insight) => self.update_live(|s| s.push_insight(insight)),
            Err(e) => warn!(error = %e, "Insight not applied to snapshot"),
        }
        self.publish_live(EventKind::Insight, payload, Severity::Low);
    }

    fn callbacks(self: &Arc<Self>) -> ConnectionCallbacks {
        let metrics = Arc::downgrade(self);
        let notification = Arc::downgrade(self);
        let insight = Arc::downgrade(self);

        ConnectionCallbacks::new()
            .on_metrics(move |payload| {
                if let Some(inner) = metrics.upgrade() {
                    inner.apply_metrics(payload);
                }
            })
            .on_notification(move |payload| {
                if let Some(inner) = notification.upgrade() {
                    inner.apply_notification(payload);
                }
            })
            .on_insight(move |payload| {
                if let Some(inner) = insight.upgrade() {
                    inner.apply_insight(payload);
                }
            })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Run resources
    // ─────────────────────────────────────────────────────────────────────────

    /// Bring the connection in line with `enabled`.
    ///
    /// Returns a manager that was taken out of service; the caller shuts it
    /// down outside the lock.
    fn sync_connection(self: &Arc<Self>, enabled: bool) -> Option<Arc<ConnectionManager>> {
        let mut guard = self.run.lock();
        let run = guard.as_mut()?;

        if !enabled {
            return run.connection.take();
        }

        let live = run
            .connection
            .as_ref()
            .map_or(false, |c| c.state() != ConnectionState::Closed);
        if live {
            return None;
        }

        let manager = Arc::new(ConnectionManager::new(
            self.options.connection.clone(),
            self.transport.clone(),
            self.services.bus.clone(),
            self.callbacks(),
        ));
        manager.connect();
        run.connection.replace(manager)
    }

    /// Start the refresh task, or restart it if its period changed.
    fn sync_refresh(self: &Arc<Self>, config: &Config) {
        let period = self.refresh_period(config);
        let mut guard = self.run.lock();
        let Some(run) = guard.as_mut() else {
            return;
        };

        if matches!(&run.refresh, Some((current, _)) if *current == period) {
            return;
        }
        if let Some((_, handle)) = run.refresh.take() {
            handle.abort();
        }

        debug!(period_secs = period.as_secs(), "Starting refresh task");
        let handle = self.spawn_refresh(run.generation, period, run.cancel.clone());
        run.refresh = Some((period, handle));
    }

    fn spawn_refresh(
        self: &Arc<Self>,
        generation: u64,
        period: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let inner = Arc::downgrade(self);

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let Some(inner) = inner.upgrade() else {
                    break;
                };
                match inner.load_snapshot(generation, false).await {
                    Ok(_) => {}
                    Err(e) if e.code() == ErrorCode::CoordinatorStopped => break,
                    Err(e) => warn!(error = %e, "Periodic refresh failed"),
                }
            }
            debug!(generation, "Refresh task finished");
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// State Coordinator
// ═══════════════════════════════════════════════════════════════════════════════

/// Drives the dashboard: snapshot, actions, configuration and live link.
pub struct StateCoordinator {
    inner: Arc<Inner>,
}

impl StateCoordinator {
    pub fn new(
        services: Arc<SharedServices>,
        backend: Arc<dyn Backend>,
        transport: Arc<dyn Transport>,
        config: ConfigManager,
        options: CoordinatorOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                services,
                backend,
                transport,
                config,
                options,
                generations: AtomicU64::new(0),
                snapshot: RwLock::new(None),
                run: Mutex::new(None),
            }),
        }
    }

    /// Wire the HTTP backend and WebSocket transport from settings.
    pub fn from_settings(settings: &Settings, services: Arc<SharedServices>, config: ConfigManager) -> Result<Self> {
        let backend = HttpBackend::from_settings(&settings.api)?;
        Ok(Self::new(
            services,
            Arc::new(backend),
            Arc::new(WsTransport::default()),
            config,
            settings.coordinator_options(),
        ))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Load the initial snapshot, open the real-time link if enabled and
    /// start the refresh timer.
    ///
    /// A failed initial load is logged and published as a `system_event`;
    /// the coordinator still starts and the refresh timer retries.
    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<()> {
        let generation = {
            let mut run = self.inner.run.lock();
            if run.is_some() {
                return Err(VigilError::new(ErrorCode::AlreadyStarted, "Coordinator is already running"));
            }
            let generation = self.inner.generations.fetch_add(1, Ordering::SeqCst) + 1;
            *run = Some(Run {
                generation,
                cancel: CancellationToken::new(),
                connection: None,
                refresh: None,
            });
            generation
        };
        info!(generation, "Starting coordinator");

        match self.inner.load_snapshot(generation, false).await {
            Ok(_) => {}
            Err(e) if e.code() == ErrorCode::CoordinatorStopped => return Err(e),
            Err(e) => {
                e.log();
                self.inner.services.bus.publish(
                    EventInput::new(
                        EventKind::SystemEvent,
                        json!({ "operation": "initial_load", "code": e.code(), "error": e.to_string() }),
                    )
                    .with_severity(Severity::High)
                    .with_source(COORDINATOR_SOURCE),
                );
            }
        }

        let config = self.inner.config.current();
        let replaced = self.inner.sync_connection(config.monitoring.enable_real_time_monitoring);
        self.inner.sync_refresh(&config);
        if let Some(manager) = replaced {
            manager.shutdown().await;
        }

        if !self.inner.is_current(generation) {
            return Err(VigilError::coordinator_stopped());
        }
        Ok(())
    }

    /// Release the connection and timers. Bus, cache and monitor are kept,
    /// as is the last snapshot.
    #[instrument(skip(self))]
    pub async fn stop(&self) {
        let Some(run) = self.inner.run.lock().take() else {
            debug!("stop() on idle coordinator");
            return;
        };

        run.cancel.cancel();
        if let Some(connection) = run.connection {
            connection.shutdown().await;
        }
        info!(generation = run.generation, "Coordinator stopped");
    }

    pub fn is_running(&self) -> bool {
        self.inner.run.lock().is_some()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Reload the snapshot; `force` bypasses the cache.
    pub async fn refresh_data(&self, force: bool) -> Result<DashboardSnapshot> {
        let generation = self.inner.current_generation()?;
        self.inner.load_snapshot(generation, force).await
    }

    /// Run a dashboard action through the backend.
    ///
    /// Success publishes `user_action` and drops the cached dashboard.
    /// Failure publishes a high-severity `system_event` and is returned.
    #[instrument(skip(self, params))]
    pub async fn execute_action(&self, name: &str, params: Value) -> Result<ActionResult> {
        self.inner.current_generation()?;
        let services = &self.inner.services;

        let started = Instant::now();
        let outcome = self.inner.backend.execute_action(name, &params).await;
        let elapsed = started.elapsed();

        match outcome {
            Ok(result) => {
                services.monitor.record_latency(elapsed);
                ActionMetrics::record(name, elapsed.as_secs_f64(), true);

                let invalidated = services.cache.clear(Some(DASHBOARD_CACHE_PREFIX));
                services.bus.publish(
                    EventInput::new(
                        EventKind::UserAction,
                        json!({ "action": name, "params": params, "result": result.data }),
                    )
                    .with_source(COORDINATOR_SOURCE)
                    .with_entity("action", name),
                );
                info!(action = name, invalidated, "Action completed");
                Ok(result)
            }
            Err(e) => {
                services.monitor.record_error();
                ActionMetrics::record(name, elapsed.as_secs_f64(), false);

                services.bus.publish(
                    EventInput::new(
                        EventKind::SystemEvent,
                        json!({ "action": name, "params": params, "code": e.code(), "error": e.to_string() }),
                    )
                    .with_severity(Severity::High)
                    .with_source(COORDINATOR_SOURCE)
                    .with_entity("action", name),
                );

                let err = VigilError::action_failed(name, e.to_string()).with_source(e);
                err.log();
                Err(err)
            }
        }
    }

    /// Validate, push and apply configuration overrides.
    ///
    /// Rejected locally when invalid, so the backend never sees a bad tree.
    /// Flipping `monitoring.enableRealTimeMonitoring` opens or closes the
    /// link while running.
    #[instrument(skip(self, updates))]
    pub async fn update_config(&self, updates: &Value) -> Result<Arc<Config>> {
        let (_, report) = self.inner.config.preview(updates)?;
        if !report.is_valid {
            ActionMetrics::record_config_update(false);
            return Err(VigilError::config_validation(report.errors));
        }

        let started = Instant::now();
        if let Err(e) = self.inner.backend.update_config(updates).await {
            self.inner.services.monitor.record_error();
            ActionMetrics::record_config_update(false);
            return Err(e);
        }
        self.inner.services.monitor.record_request(started);

        let previous = self.inner.config.current();
        let config = match self.inner.config.update(updates) {
            Ok(config) => config,
            Err(e) => {
                ActionMetrics::record_config_update(false);
                return Err(e);
            }
        };
        ActionMetrics::record_config_update(true);

        self.inner.services.bus.publish(
            EventInput::new(EventKind::ConfigUpdated, json!({ "updates": updates }))
                .with_severity(Severity::Low)
                .with_source(COORDINATOR_SOURCE),
        );

        let enabled = config.monitoring.enable_real_time_monitoring;
        let replaced = if enabled != previous.monitoring.enable_real_time_monitoring {
            info!(real_time_monitoring = enabled, "Real-time monitoring toggled");
            self.inner.sync_connection(enabled)
        } else {
            None
        };
        self.inner.sync_refresh(&config);
        if let Some(manager) = replaced {
            manager.shutdown().await;
        }

        Ok(config)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// Last loaded snapshot with live updates applied.
    pub fn snapshot(&self) -> Option<DashboardSnapshot> {
        self.inner.snapshot.read().clone()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.services.monitor.get_metrics()
    }

    /// `Disconnected` when no link is held.
    pub fn connection_state(&self) -> ConnectionState {
        self.connection()
            .map_or(ConnectionState::Disconnected, |c| c.state())
    }

    pub fn connection(&self) -> Option<Arc<ConnectionManager>> {
        self.inner
            .run
            .lock()
            .as_ref()
            .and_then(|run| run.connection.clone())
    }

    pub fn config(&self) -> Arc<Config> {
        self.inner.config.current()
    }

    pub fn services(&self) -> &Arc<SharedServices> {
        &self.inner.services
    }
}

impl Drop for StateCoordinator {
    fn drop(&mut self) {
        if let Some(run) = self.inner.run.lock().take() {
            run.cancel.cancel();
            if let Some(connection) = run.connection {
                connection.disconnect();
            }
        }
    }
}

impl std::fmt::Debug for StateCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateCoordinator")
            .field("running", &self.is_running())
            .field("connection_state", &self.connection_state())
            .field("options", &self.inner.options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ActivityEntry, ComplianceStatus};
    use crate::connection::Link;
    use crate::events::HistoryFilter;
    use async_trait::async_trait;

    struct StaticBackend;

    #[async_trait]
    impl Backend for StaticBackend {
        async fn fetch_status(&self) -> Result<ComplianceStatus> {
            Ok(ComplianceStatus::default())
        }
        async fn fetch_metrics(&self) -> Result<DashboardMetrics> {
            Ok(DashboardMetrics::default())
        }
        async fn fetch_events(&self) -> Result<Vec<ActivityEntry>> {
            Ok(Vec::new())
        }
        async fn fetch_notifications(&self) -> Result<Vec<Notification>> {
            Ok(Vec::new())
        }
        async fn fetch_insights(&self) -> Result<Vec<Insight>> {
            Ok(Vec::new())
        }
        async fn execute_action(&self, _action: &str, _params: &Value) -> Result<ActionResult> {
            Ok(ActionResult::default())
        }
        async fn update_config(&self, _updates: &Value) -> Result<()> {
            Ok(())
        }
    }

    struct RefusingTransport;

    #[async_trait]
    impl Transport for RefusingTransport {
        async fn open(&self, _url: &str) -> Result<Link> {
            Err(VigilError::new(ErrorCode::ConnectionFailed, "refused"))
        }
    }

    fn coordinator(options: CoordinatorOptions) -> StateCoordinator {
        StateCoordinator::new(
            SharedServices::new(100, 10),
            Arc::new(StaticBackend),
            Arc::new(RefusingTransport),
            ConfigManager::with_overrides(&json!({
                "monitoring": { "enableRealTimeMonitoring": false }
            }))
            .unwrap(),
            options,
        )
    }

    #[test]
    fn test_refresh_period_follows_monitoring_interval() {
        let c = coordinator(CoordinatorOptions::default());
        let config = c.config();
        assert_eq!(
            c.inner.refresh_period(&config),
            Duration::from_secs(config.monitoring.monitoring_interval)
        );
    }

    #[test]
    fn test_refresh_period_override_is_clamped() {
        let c = coordinator(CoordinatorOptions {
            refresh_interval: Some(Duration::ZERO),
            ..Default::default()
        });
        assert_eq!(c.inner.refresh_period(&c.config()), MIN_REFRESH_PERIOD);
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let c = coordinator(CoordinatorOptions::default());
        c.start().await.unwrap();

        let err = c.start().await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::AlreadyStarted);
        c.stop().await;
    }

    #[tokio::test]
    async fn test_operations_after_stop_are_rejected() {
        let c = coordinator(CoordinatorOptions::default());
        c.start().await.unwrap();
        c.stop().await;

        assert!(!c.is_running());
        assert_eq!(
            c.refresh_data(true).await.unwrap_err().code(),
            ErrorCode::CoordinatorStopped
        );
        assert_eq!(
            c.execute_action("noop", Value::Null).await.unwrap_err().code(),
            ErrorCode::CoordinatorStopped
        );
        assert!(c.snapshot().is_some());
    }

    #[tokio::test]
    async fn test_unreadable_live_frames_still_reach_the_bus() {
        let c = coordinator(CoordinatorOptions::default());
        c.start().await.unwrap();

        c.inner.apply_notification(json!({ "id": "n-untitled", "severity": "high" }));
        c.inner.apply_insight(json!({ "id": "i-untitled", "confidence": 0.4 }));

        let snapshot = c.snapshot().unwrap();
        assert!(snapshot.notifications.is_empty());
        assert!(snapshot.insights.is_empty());

        let bus = &c.services().bus;
        let notifications = bus.history(&HistoryFilter::new().kind(EventKind::Notification), None);
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].severity, Severity::High);
        assert_eq!(notifications[0].source, WEBSOCKET_SOURCE);
        assert_eq!(notifications[0].entity_type.as_deref(), Some("notification"));
        assert_eq!(notifications[0].entity_id.as_deref(), Some("n-untitled"));
        assert_eq!(notifications[0].payload["id"], "n-untitled");

        let insights = bus.history(&HistoryFilter::new().kind(EventKind::Insight), None);
        assert_eq!(insights.len(), 1);
        assert_eq!(insights[0].entity_id.as_deref(), Some("i-untitled"));

        c.stop().await;
    }

    #[tokio::test]
    async fn test_live_update_without_snapshot_is_published_only() {
        let c = coordinator(CoordinatorOptions::default());
        c.inner.apply_metrics(json!({ "complianceScore": 64.0 }));

        assert!(c.snapshot().is_none());
        assert_eq!(c.services().bus.history_len(), 1);
    }
}
