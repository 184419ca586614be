//! Rule checks over a merged [`Config`].
//!
//! Validation is a pure function that reports every broken rule at once.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::model::Config;

pub const MIN_AI_INSIGHT_REFRESH_SECS: u64 = 30;
pub const MIN_CONCURRENT_USERS: u32 = 1;
pub const MIN_MONITORING_INTERVAL_SECS: u64 = 10;
pub const MIN_SESSION_TIMEOUT_SECS: u64 = 300;

/// A single broken rule, addressed by its dotted camelCase path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigViolation {
    pub field: String,
    pub message: String,
}

impl ConfigViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Outcome of [`validate_config`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<ConfigViolation>,
}

impl ValidationReport {
    pub fn from_errors(errors: Vec<ConfigViolation>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }
}

/// Check every rule and collect all violations.
pub fn validate_config(config: &Config) -> ValidationReport {
    let mut errors = Vec::new();

    if config.analytics.ai_insight_refresh_interval < MIN_AI_INSIGHT_REFRESH_SECS {
        errors.push(ConfigViolation::new(
            "analytics.aiInsightRefreshInterval",
            format!("must be >= {} seconds", MIN_AI_INSIGHT_REFRESH_SECS),
        ));
    }

    if config.collaboration.max_concurrent_users < MIN_CONCURRENT_USERS {
        errors.push(ConfigViolation::new(
            "collaboration.maxConcurrentUsers",
            format!("must be >= {}", MIN_CONCURRENT_USERS),
        ));
    }

    if config.monitoring.monitoring_interval < MIN_MONITORING_INTERVAL_SECS {
        errors.push(ConfigViolation::new(
            "monitoring.monitoringInterval",
            format!("must be >= {} seconds", MIN_MONITORING_INTERVAL_SECS),
        ));
    }

    if config.security.session_timeout < MIN_SESSION_TIMEOUT_SECS {
        errors.push(ConfigViolation::new(
            "security.sessionTimeout",
            format!("must be >= {} seconds", MIN_SESSION_TIMEOUT_SECS),
        ));
    }

    let thresholds = &config.monitoring.alert_thresholds;
    for (field, value) in [
        ("complianceScore", thresholds.compliance_score),
        ("riskScore", thresholds.risk_score),
        ("errorRate", thresholds.error_rate),
    ] {
        if !(0.0..=100.0).contains(&value) {
            errors.push(ConfigViolation::new(
                format!("monitoring.alertThresholds.{}", field),
                "must be between 0 and 100",
            ));
        }
    }

    let frameworks = &config.frameworks;
    if !frameworks.enabled.iter().any(|f| f == &frameworks.default_framework) {
        errors.push(ConfigViolation::new(
            "frameworks.defaultFramework",
            format!(
                "'{}' is not one of the enabled frameworks",
                frameworks.default_framework
            ),
        ));
    }

    ValidationReport::from_errors(errors)
}
