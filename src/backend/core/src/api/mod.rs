//! REST collaborator interface.
//!
//! The dashboard backend's business logic is out of reach; this module only
//! fixes the shapes it exchanges and the calls the coordinator makes.
//!
//! | Call                    | HTTP                                  |
//! |-------------------------|---------------------------------------|
//! | `fetch_status`          | `GET /status`                         |
//! | `fetch_metrics`         | `GET /metrics`                        |
//! | `fetch_events`          | `GET /events`                         |
//! | `fetch_notifications`   | `GET /notifications`                  |
//! | `fetch_insights`        | `GET /insights`                       |
//! | `execute_action`        | `POST /actions {action, params}`      |
//! | `update_config`         | `POST /config {updates}`              |

pub mod http;
pub mod models;

pub use http::HttpBackend;
pub use models::{
    ActionRequest, ActionResult, ActivityEntry, ComplianceStatus, ConfigUpdateRequest,
    DashboardMetrics, FrameworkStatus, Insight, Notification,
};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Calls the coordinator makes against the dashboard backend.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    async fn fetch_status(&self) -> Result<ComplianceStatus>;

    async fn fetch_metrics(&self) -> Result<DashboardMetrics>;

    async fn fetch_events(&self) -> Result<Vec<ActivityEntry>>;

    async fn fetch_notifications(&self) -> Result<Vec<Notification>>;

    async fn fetch_insights(&self) -> Result<Vec<Insight>>;

    /// Run a named dashboard action.
    async fn execute_action(&self, action: &str, params: &Value) -> Result<ActionResult>;

    /// Push configuration overrides.
    async fn update_config(&self, updates: &Value) -> Result<()>;
}
