//! Self-healing real-time link.
//!
//! [`ConnectionManager`] owns the state machine and a single driver task.
//! The driver opens the transport, runs the connected session (inbound
//! routing plus heartbeat), and on failure waits out the backoff before the
//! next open. `disconnect()` cancels whatever the driver is awaiting.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::message::{InboundMessage, OutboundMessage};
use super::state::{ConnectionEvent, ConnectionMachine, ConnectionState, ReconnectPolicy, Recovery};
use super::transport::{Link, LinkEvent, Transport};
use crate::error::VigilError;
use crate::events::EventBus;
use crate::telemetry::ConnectionMetrics;

/// Source recorded on events that arrive over the socket.
pub const WEBSOCKET_SOURCE: &str = "websocket";

/// Shortest heartbeat period; smaller configured values are raised to it.
pub const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

// ═══════════════════════════════════════════════════════════════════════════════
// Options and callbacks
// ═══════════════════════════════════════════════════════════════════════════════

/// Connection configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOptions {
    pub url: String,
    /// Backoff delay is `reconnect_base_delay * attempt`
    pub reconnect_base_delay: Duration,
    /// Consecutive failures before giving up
    pub max_reconnect_attempts: u32,
    /// Clamped to [`MIN_HEARTBEAT_INTERVAL`] when the link starts
    pub heartbeat_interval: Duration,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8080/ws".to_string(),
            reconnect_base_delay: Duration::from_secs(1),
            max_reconnect_attempts: 5,
            heartbeat_interval: Duration::from_secs(30),
        }
    }
}

impl ConnectionOptions {
    /// Heartbeat period actually used, never below [`MIN_HEARTBEAT_INTERVAL`].
    pub fn heartbeat_period(&self) -> Duration {
        self.heartbeat_interval.max(MIN_HEARTBEAT_INTERVAL)
    }

    fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            base_delay: self.reconnect_base_delay,
            max_attempts: self.max_reconnect_attempts,
        }
    }
}

type PayloadCallback = Arc<dyn Fn(Value) + Send + Sync>;

/// Receivers for the payloads that do not go to the event bus.
#[derive(Clone, Default)]
pub struct ConnectionCallbacks {
    on_metrics: Option<PayloadCallback>,
    on_notification: Option<PayloadCallback>,
    on_insight: Option<PayloadCallback>,
}

impl ConnectionCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_metrics(mut self, f: impl Fn(Value) + Send + Sync + 'static) -> Self {
        self.on_metrics = Some(Arc::new(f));
        self
    }

    pub fn on_notification(mut self, f: impl Fn(Value) + Send + Sync + 'static) -> Self {
        self.on_notification = Some(Arc::new(f));
        self
    }

    pub fn on_insight(mut self, f: impl Fn(Value) + Send + Sync + 'static) -> Self {
        self.on_insight = Some(Arc::new(f));
        self
    }
}

impl std::fmt::Debug for ConnectionCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionCallbacks")
            .field("on_metrics", &self.on_metrics.is_some())
            .field("on_notification", &self.on_notification.is_some())
            .field("on_insight", &self.on_insight.is_some())
            .finish()
    }
}

/// Link counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStats {
    pub opens: u64,
    pub failures: u64,
    pub frames_received: u64,
    pub frames_dropped: u64,
    pub frames_sent: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// Shared state
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Default)]
struct Counters {
    opens: AtomicU64,
    failures: AtomicU64,
    frames_received: AtomicU64,
    frames_dropped: AtomicU64,
    frames_sent: AtomicU64,
}

struct Shared {
    machine: Mutex<ConnectionMachine>,
    state_tx: watch::Sender<ConnectionState>,
    outbound: Mutex<Option<mpsc::UnboundedSender<String>>>,
    counters: Counters,
}

impl Shared {
    /// Apply `event`; false if the edge does not exist in the current state.
    fn apply(&self, event: ConnectionEvent) -> bool {
        let (from, to) = {
            let mut machine = self.machine.lock();
            let from = machine.state();
            (from, machine.apply(event))
        };

        match to {
            Some(state) => {
                self.announce(state);
                debug!(from = %from, to = %state, event = ?event, "Connection transition");
                true
            }
            None => {
                debug!(state = %from, event = ?event, "Ignoring transition");
                false
            }
        }
    }

    fn on_failure(&self) -> Recovery {
        let (recovery, state) = {
            let mut machine = self.machine.lock();
            let recovery = machine.on_failure();
            (recovery, machine.state())
        };
        if recovery != Recovery::Ignored {
            self.announce(state);
        }
        recovery
    }

    fn announce(&self, state: ConnectionState) {
        ConnectionMetrics::record_state(state.code());
        self.state_tx.send_replace(state);
    }

    fn state(&self) -> ConnectionState {
        self.machine.lock().state()
    }

    fn send_text(&self, text: String) -> bool {
        if self.state() != ConnectionState::Connected {
            return false;
        }
        let sent = match self.outbound.lock().as_ref() {
            Some(tx) => tx.send(text).is_ok(),
            None => false,
        };
        if sent {
            self.counters.frames_sent.fetch_add(1, Ordering::Relaxed);
            ConnectionMetrics::record_sent();
        }
        sent
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Connection Manager
// ═══════════════════════════════════════════════════════════════════════════════

/// Owner of the real-time link.
pub struct ConnectionManager {
    options: ConnectionOptions,
    transport: Arc<dyn Transport>,
    bus: Arc<EventBus>,
    callbacks: ConnectionCallbacks,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    pub fn new(
        options: ConnectionOptions,
        transport: Arc<dyn Transport>,
        bus: Arc<EventBus>,
        callbacks: ConnectionCallbacks,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let shared = Arc::new(Shared {
            machine: Mutex::new(ConnectionMachine::new(options.policy())),
            state_tx,
            outbound: Mutex::new(None),
            counters: Counters::default(),
        });

        Self {
            options,
            transport,
            bus,
            callbacks,
            shared,
            cancel: CancellationToken::new(),
            driver: Mutex::new(None),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Start connecting. Returns false unless the manager was `Disconnected`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&self) -> bool {
        if !self.shared.apply(ConnectionEvent::Connect) {
            warn!(state = %self.state(), "connect() ignored");
            return false;
        }

        info!(url = %self.options.url, "Connecting");
        let driver = Driver {
            url: self.options.url.clone(),
            heartbeat_interval: self.options.heartbeat_period(),
            transport: self.transport.clone(),
            bus: self.bus.clone(),
            callbacks: self.callbacks.clone(),
            shared: self.shared.clone(),
            cancel: self.cancel.clone(),
        };
        *self.driver.lock() = Some(tokio::spawn(driver.run()));
        true
    }

    /// Stop for good: cancel pending backoff and heartbeat, close the
    /// socket, move to `Closed`. Safe to call repeatedly.
    pub fn disconnect(&self) {
        let changed = self.shared.apply(ConnectionEvent::Disconnect);
        self.cancel.cancel();
        self.shared.outbound.lock().take();
        if changed {
            info!(url = %self.options.url, "Disconnected");
        }
    }

    /// [`disconnect`](Self::disconnect) and wait for the driver task to end.
    pub async fn shutdown(&self) {
        self.disconnect();
        let driver = self.driver.lock().take();
        if let Some(handle) = driver {
            if let Err(e) = handle.await {
                error!(error = %e, "Connection driver ended abnormally");
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Sending
    // ─────────────────────────────────────────────────────────────────────────

    /// Send `message` as a JSON text frame.
    ///
    /// Returns false, and sends nothing, unless `Connected`. Nothing is
    /// queued for later delivery.
    pub fn send(&self, message: &Value) -> bool {
        self.send_text(message.to_string())
    }

    /// Send a raw text frame with the same rules as [`send`](Self::send).
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        let sent = self.shared.send_text(text.into());
        if !sent {
            debug!(state = %self.state(), "Dropping outbound frame");
        }
        sent
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Consecutive failures since the last successful open.
    pub fn attempts(&self) -> u32 {
        self.shared.machine.lock().attempts()
    }

    /// Observe state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    pub fn stats(&self) -> ConnectionStats {
        let c = &self.shared.counters;
        ConnectionStats {
            opens: c.opens.load(Ordering::Relaxed),
            failures: c.failures.load(Ordering::Relaxed),
            frames_received: c.frames_received.load(Ordering::Relaxed),
            frames_dropped: c.frames_dropped.load(Ordering::Relaxed),
            frames_sent: c.frames_sent.load(Ordering::Relaxed),
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("url", &self.options.url)
            .field("state", &self.state())
            .field("attempts", &self.attempts())
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Driver task
// ═══════════════════════════════════════════════════════════════════════════════

enum SessionEnd {
    Cancelled,
    Failed(String),
}

struct Driver {
    url: String,
    heartbeat_interval: Duration,
    transport: Arc<dyn Transport>,
    bus: Arc<EventBus>,
    callbacks: ConnectionCallbacks,
    shared: Arc<Shared>,
    cancel: CancellationToken,
}

impl Driver {
    async fn run(self) {
        loop {
            ConnectionMetrics::record_attempt();
            let opened = tokio::select! {
                _ = self.cancel.cancelled() => return,
                opened = self.transport.open(&self.url) => opened,
            };

            let reason = match opened {
                Ok(link) => {
                    if !self.shared.apply(ConnectionEvent::Opened) {
                        return;
                    }
                    self.shared.counters.opens.fetch_add(1, Ordering::Relaxed);
                    info!(url = %self.url, "Connected");

                    match self.session(link).await {
                        SessionEnd::Cancelled => return,
                        SessionEnd::Failed(reason) => reason,
                    }
                }
                Err(e) => e.to_string(),
            };

            self.shared.counters.failures.fetch_add(1, Ordering::Relaxed);
            ConnectionMetrics::record_failure("transport");

            match self.shared.on_failure() {
                Recovery::Retry { attempt, delay } => {
                    warn!(
                        url = %self.url,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        reason = %reason,
                        "Connection lost, reconnecting"
                    );
                    tokio::select! {
                        _ = self.cancel.cancelled() => return,
                        _ = tokio::time::sleep(delay) => {}
                    }
                    if !self.shared.apply(ConnectionEvent::BackoffElapsed) {
                        return;
                    }
                }
                Recovery::GiveUp => {
                    error!(url = %self.url, reason = %reason, "Reconnect attempts exhausted");
                    return;
                }
                Recovery::Ignored => return,
            }
        }
    }

    /// Run one connected session until the link fails or we are cancelled.
    async fn session(&self, link: Link) -> SessionEnd {
        let Link { outbound, mut inbound } = link;
        *self.shared.outbound.lock() = Some(outbound);

        let mut heartbeat = interval_at(
            Instant::now() + self.heartbeat_interval,
            self.heartbeat_interval,
        );
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let end = loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break SessionEnd::Cancelled,
                _ = heartbeat.tick() => self.send_heartbeat(),
                event = inbound.recv() => match event {
                    Some(LinkEvent::Message(text)) => self.handle_frame(&text),
                    Some(LinkEvent::Error(reason)) => break SessionEnd::Failed(reason),
                    Some(LinkEvent::Closed) | None => {
                        break SessionEnd::Failed("socket closed".to_string())
                    }
                },
            }
        };

        self.shared.outbound.lock().take();
        end
    }

    fn send_heartbeat(&self) {
        match OutboundMessage::Heartbeat.encode() {
            Ok(frame) => {
                if self.shared.send_text(frame) {
                    debug!("Heartbeat sent");
                }
            }
            Err(e) => e.log(),
        }
    }

    fn handle_frame(&self, text: &str) {
        let message = match InboundMessage::decode(text) {
            Ok(message) => message,
            Err(e) => {
                self.shared.counters.frames_dropped.fetch_add(1, Ordering::Relaxed);
                ConnectionMetrics::record_dropped("malformed");
                warn!(
                    error_code = %e.code(),
                    detail = ?e.internal_message(),
                    "Dropping malformed frame"
                );
                return;
            }
        };

        self.shared.counters.frames_received.fetch_add(1, Ordering::Relaxed);
        ConnectionMetrics::record_frame(message.type_name());

        match message {
            InboundMessage::ComplianceEvent(input) => {
                let input = if input.source.is_none() {
                    input.with_source(WEBSOCKET_SOURCE)
                } else {
                    input
                };
                self.bus.publish(input);
            }
            InboundMessage::MetricsUpdate(payload) => {
                invoke("metrics_update", self.callbacks.on_metrics.as_ref(), payload)
            }
            InboundMessage::Notification(payload) => {
                invoke("notification", self.callbacks.on_notification.as_ref(), payload)
            }
            InboundMessage::Insight(payload) => {
                invoke("insight", self.callbacks.on_insight.as_ref(), payload)
            }
            InboundMessage::Heartbeat => {}
            InboundMessage::Unknown { kind } => {
                self.shared.counters.frames_dropped.fetch_add(1, Ordering::Relaxed);
                ConnectionMetrics::record_dropped("unknown_type");
                let e = VigilError::unknown_message_type(kind);
                warn!(
                    error_code = %e.code(),
                    detail = ?e.internal_message(),
                    "Dropping frame with unknown type"
                );
            }
        }
    }
}

fn invoke(kind: &'static str, callback: Option<&PayloadCallback>, payload: Value) {
    let Some(callback) = callback else {
        debug!(kind, "No callback registered");
        return;
    };
    if catch_unwind(AssertUnwindSafe(|| callback(payload))).is_err() {
        error!(kind, "Connection callback panicked");
    }
}
