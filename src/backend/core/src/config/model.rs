//! Dashboard configuration tree and its built-in defaults.
//!
//! The tree is serialized as nested camelCase JSON, the same shape the
//! `POST /config` collaborator accepts.

use serde::{Deserialize, Serialize};

/// Fully populated dashboard configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    pub analytics: AnalyticsConfig,
    pub collaboration: CollaborationConfig,
    pub workflows: WorkflowConfig,
    pub monitoring: MonitoringConfig,
    pub frameworks: FrameworkConfig,
    pub security: SecurityConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            analytics: AnalyticsConfig::default(),
            collaboration: CollaborationConfig::default(),
            workflows: WorkflowConfig::default(),
            monitoring: MonitoringConfig::default(),
            frameworks: FrameworkConfig::default(),
            security: SecurityConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsConfig {
    /// Stream analytics updates as they arrive
    pub enable_real_time_updates: bool,

    /// Seconds between AI insight regenerations
    pub ai_insight_refresh_interval: u64,

    pub enable_predictive_analytics: bool,

    /// Days of analytics history kept by the backend
    pub data_retention_days: u32,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            enable_real_time_updates: true,
            ai_insight_refresh_interval: 300,
            enable_predictive_analytics: true,
            data_retention_days: 90,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollaborationConfig {
    pub enable_real_time_collaboration: bool,
    pub max_concurrent_users: u32,
    pub enable_comments: bool,
    pub enable_notifications: bool,
}

impl Default for CollaborationConfig {
    fn default() -> Self {
        Self {
            enable_real_time_collaboration: true,
            max_concurrent_users: 50,
            enable_comments: true,
            enable_notifications: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowConfig {
    pub enable_automation: bool,
    pub max_concurrent_workflows: u32,

    /// Seconds before a pending approval lapses
    pub default_approval_timeout: u64,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            enable_automation: true,
            max_concurrent_workflows: 10,
            default_approval_timeout: 86_400,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringConfig {
    /// Gates the WebSocket connection
    pub enable_real_time_monitoring: bool,

    /// Seconds between periodic data refreshes
    pub monitoring_interval: u64,

    pub alert_thresholds: AlertThresholds,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enable_real_time_monitoring: true,
            monitoring_interval: 60,
            alert_thresholds: AlertThresholds::default(),
        }
    }
}

/// Percentages that trigger dashboard alerts.
///
/// Missing fields fall back to their defaults so a section replaced by a
/// partial override is still fully populated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlertThresholds {
    pub compliance_score: f64,
    pub risk_score: f64,
    pub error_rate: f64,
    pub response_time_ms: u64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            compliance_score: 80.0,
            risk_score: 70.0,
            error_rate: 5.0,
            response_time_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameworkConfig {
    pub enabled: Vec<String>,
    pub default_framework: String,
    pub auto_mapping: bool,
}

impl Default for FrameworkConfig {
    fn default() -> Self {
        Self {
            enabled: vec![
                "SOC2".to_string(),
                "ISO27001".to_string(),
                "GDPR".to_string(),
                "HIPAA".to_string(),
            ],
            default_framework: "SOC2".to_string(),
            auto_mapping: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityConfig {
    /// Seconds of inactivity before the session expires
    pub session_timeout: u64,
    pub require_mfa: bool,
    pub audit_logging: bool,
    pub encryption_enabled: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            session_timeout: 3_600,
            require_mfa: false,
            audit_logging: true,
            encryption_enabled: true,
        }
    }
}
