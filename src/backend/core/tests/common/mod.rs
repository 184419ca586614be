//! In-memory collaborators shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

use vigil_core::api::{
    ActionResult, ActivityEntry, Backend, ComplianceStatus, DashboardMetrics, Insight, Notification,
};
use vigil_core::connection::{ConnectionManager, ConnectionState, Link, LinkEvent, Transport};
use vigil_core::{ErrorCode, Result, VigilError};

// ============================================================================
// Transport
// ============================================================================

/// Outcome of one `open()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Fail,
    Accept,
}

/// The server side of an accepted link.
pub struct ServerEnd {
    pub to_client: mpsc::UnboundedSender<LinkEvent>,
    pub from_client: mpsc::UnboundedReceiver<String>,
}

impl ServerEnd {
    pub fn push(&self, frame: Value) {
        self.push_raw(frame.to_string());
    }

    pub fn push_raw(&self, text: impl Into<String>) {
        let _ = self.to_client.send(LinkEvent::Message(text.into()));
    }

    pub fn close(&self) {
        let _ = self.to_client.send(LinkEvent::Closed);
    }

    /// Report a socket error on the live link.
    pub fn fail(&self, reason: &str) {
        let _ = self.to_client.send(LinkEvent::Error(reason.to_string()));
    }

    pub async fn next_frame(&mut self) -> Value {
        let text = self.from_client.recv().await.expect("client closed the link");
        serde_json::from_str(&text).expect("client sent invalid JSON")
    }
}

/// Transport that follows a script, then `fallback` forever.
pub struct MockTransport {
    script: Mutex<VecDeque<Step>>,
    fallback: Step,
    opens: Mutex<Vec<Instant>>,
    servers: mpsc::UnboundedSender<ServerEnd>,
}

impl MockTransport {
    pub fn new(
        script: impl IntoIterator<Item = Step>,
        fallback: Step,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
        let (servers, accepted) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            fallback,
            opens: Mutex::new(Vec::new()),
            servers,
        });
        (transport, accepted)
    }

    pub fn open_count(&self) -> usize {
        self.opens.lock().len()
    }

    pub fn open_times(&self) -> Vec<Instant> {
        self.opens.lock().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, _url: &str) -> Result<Link> {
        self.opens.lock().push(Instant::now());
        let step = self.script.lock().pop_front().unwrap_or(self.fallback);

        match step {
            Step::Fail => Err(VigilError::new(ErrorCode::ConnectionFailed, "connection refused")),
            Step::Accept => {
                let (to_client, inbound) = mpsc::unbounded_channel();
                let (outbound, from_client) = mpsc::unbounded_channel();
                let _ = self.servers.send(ServerEnd {
                    to_client,
                    from_client,
                });
                Ok(Link { outbound, inbound })
            }
        }
    }
}

/// Wait until `manager` reaches `target`.
pub async fn wait_for_state(manager: &ConnectionManager, target: ConnectionState) {
    let mut states = manager.subscribe_state();
    tokio::time::timeout(Duration::from_secs(3_600), states.wait_for(|s| *s == target))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for {}", target))
        .expect("state channel closed");
}

// ============================================================================
// Backend
// ============================================================================

/// Backend returning fixtures, with switchable failures and latency.
#[derive(Default)]
pub struct MockBackend {
    score: Mutex<f64>,
    fetch_delay: Mutex<Option<Duration>>,
    pub fail_fetches: AtomicBool,
    pub fail_actions: AtomicBool,
    pub fail_config: AtomicBool,
    pub fetches: AtomicUsize,
    pub actions: Mutex<Vec<(String, Value)>>,
    pub config_updates: Mutex<Vec<Value>>,
}

impl MockBackend {
    pub fn new(score: f64) -> Arc<Self> {
        let backend = Self::default();
        *backend.score.lock() = score;
        Arc::new(backend)
    }

    pub fn set_score(&self, score: f64) {
        *self.score.lock() = score;
    }

    pub fn set_fetch_delay(&self, delay: Option<Duration>) {
        *self.fetch_delay.lock() = delay;
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn unavailable() -> VigilError {
        VigilError::new(ErrorCode::BackendUnavailable, "backend unavailable")
    }
}

#[async_trait]
impl Backend for MockBackend {
    async fn fetch_status(&self) -> Result<ComplianceStatus> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let delay = *self.fetch_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_fetches.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        Ok(ComplianceStatus {
            overall_score: *self.score.lock(),
            open_gaps: 3,
            ..Default::default()
        })
    }

    async fn fetch_metrics(&self) -> Result<DashboardMetrics> {
        Ok(DashboardMetrics {
            compliance_score: *self.score.lock(),
            open_risks: 2,
            ..Default::default()
        })
    }

    async fn fetch_events(&self) -> Result<Vec<ActivityEntry>> {
        Ok(vec![serde_json::from_value(json!({
            "id": "evt-1",
            "type": "assessment_completed",
            "severity": "low"
        }))
        .expect("fixture")])
    }

    async fn fetch_notifications(&self) -> Result<Vec<Notification>> {
        Ok(vec![serde_json::from_value(json!({
            "id": "n-1",
            "title": "Evidence due"
        }))
        .expect("fixture")])
    }

    async fn fetch_insights(&self) -> Result<Vec<Insight>> {
        Ok(Vec::new())
    }

    async fn execute_action(&self, action: &str, params: &Value) -> Result<ActionResult> {
        self.actions.lock().push((action.to_string(), params.clone()));
        if self.fail_actions.load(Ordering::SeqCst) {
            return Err(VigilError::new(ErrorCode::BackendError, "action rejected"));
        }
        Ok(ActionResult {
            message: Some(format!("{} queued", action)),
            data: json!({ "jobId": "job-1" }),
        })
    }

    async fn update_config(&self, updates: &Value) -> Result<()> {
        if self.fail_config.load(Ordering::SeqCst) {
            return Err(Self::unavailable());
        }
        self.config_updates.lock().push(updates.clone());
        Ok(())
    }
}
