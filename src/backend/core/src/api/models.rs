//! Request and response shapes of the REST collaborator.
//!
//! Fields the dashboard does not interpret are kept in `extra` so nothing a
//! backend sends is lost on the way to the host.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::events::{EventKind, Severity};

/// `GET /status`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceStatus {
    #[serde(default)]
    pub overall_score: f64,

    #[serde(default)]
    pub frameworks: Vec<FrameworkStatus>,

    #[serde(default)]
    pub open_gaps: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_assessment: Option<DateTime<Utc>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameworkStatus {
    pub name: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub controls_total: u64,
    #[serde(default)]
    pub controls_passing: u64,
}

/// `GET /metrics`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardMetrics {
    #[serde(default)]
    pub compliance_score: f64,
    #[serde(default)]
    pub risk_score: f64,
    #[serde(default)]
    pub open_risks: u64,
    #[serde(default)]
    pub pending_workflows: u64,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One entry of `GET /events`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub id: String,

    #[serde(rename = "type")]
    pub kind: EventKind,

    #[serde(default)]
    pub severity: Severity,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default)]
    pub payload: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// One entry of `GET /notifications`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub title: String,

    #[serde(default)]
    pub message: String,

    #[serde(default)]
    pub severity: Severity,

    #[serde(default)]
    pub read: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// One entry of `GET /insights`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Insight {
    pub id: String,
    pub title: String,

    #[serde(default)]
    pub summary: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    /// 0.0 - 1.0
    #[serde(default)]
    pub confidence: f64,

    #[serde(default)]
    pub recommendations: Vec<String>,
}

/// `POST /actions` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub action: String,
    #[serde(default)]
    pub params: Value,
}

/// `POST /actions` response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default)]
    pub data: Value,
}

/// `POST /config` body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigUpdateRequest {
    pub updates: Value,
}
