//! Event definitions for the dashboard bus.
//!
//! This module provides:
//! - `EventId` and the `EventKind` tag every event carries
//! - `Event`, the immutable record stored in history and handed to handlers
//! - `EventInput`, the builder callers publish

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use uuid::Uuid;

// =============================================================================
// Event IDs
// =============================================================================

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Event Kinds
// =============================================================================

/// Tag identifying what an event is about.
///
/// Serialized as its snake_case wire name. Names outside the known set are
/// kept verbatim in [`EventKind::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    GapIdentified,
    ControlUpdated,
    AssessmentCompleted,
    PolicyChanged,
    RiskDetected,
    WorkflowUpdate,
    MetricsUpdate,
    Notification,
    Insight,
    UserAction,
    SystemEvent,
    ConfigUpdated,
    Other(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::GapIdentified => "gap_identified",
            Self::ControlUpdated => "control_updated",
            Self::AssessmentCompleted => "assessment_completed",
            Self::PolicyChanged => "policy_changed",
            Self::RiskDetected => "risk_detected",
            Self::WorkflowUpdate => "workflow_update",
            Self::MetricsUpdate => "metrics_update",
            Self::Notification => "notification",
            Self::Insight => "insight",
            Self::UserAction => "user_action",
            Self::SystemEvent => "system_event",
            Self::ConfigUpdated => "config_updated",
            Self::Other(name) => name,
        }
    }
}

impl From<&str> for EventKind {
    fn from(name: &str) -> Self {
        match name {
            "gap_identified" => Self::GapIdentified,
            "control_updated" => Self::ControlUpdated,
            "assessment_completed" => Self::AssessmentCompleted,
            "policy_changed" => Self::PolicyChanged,
            "risk_detected" => Self::RiskDetected,
            "workflow_update" => Self::WorkflowUpdate,
            "metrics_update" => Self::MetricsUpdate,
            "notification" => Self::Notification,
            "insight" => Self::Insight,
            "user_action" => Self::UserAction,
            "system_event" => Self::SystemEvent,
            "config_updated" => Self::ConfigUpdated,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for EventKind {
    fn from(name: String) -> Self {
        Self::from(name.as_str())
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event severity, ordered from least to most urgent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

// =============================================================================
// Events
// =============================================================================

/// A published event. Immutable once the bus has stamped it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: EventId,

    #[serde(rename = "type")]
    pub kind: EventKind,

    pub payload: Value,

    /// Assigned at publish time
    pub timestamp: DateTime<Utc>,

    pub severity: Severity,

    /// Where the event came from (`system`, `websocket`, `coordinator`, ...)
    pub source: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,

    #[serde(default)]
    pub metadata: HashMap<String, Value>,

    #[serde(default)]
    pub acknowledged: bool,

    #[serde(default)]
    pub tags: BTreeSet<String>,
}

impl Event {
    /// Stamp `input` with a fresh id and the current time.
    pub(crate) fn stamp(input: EventInput, default_source: &str) -> Self {
        Self {
            id: EventId::new(),
            kind: input.kind,
            payload: input.payload,
            timestamp: Utc::now(),
            severity: input.severity,
            source: input.source.unwrap_or_else(|| default_source.to_string()),
            actor_id: input.actor_id,
            entity_id: input.entity_id,
            entity_type: input.entity_type,
            metadata: input.metadata,
            acknowledged: false,
            tags: input.tags,
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

/// What a caller hands to [`EventBus::publish`](super::EventBus::publish).
///
/// Also the `payload` shape of an inbound `compliance_event` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventInput {
    #[serde(rename = "type")]
    pub kind: EventKind,

    #[serde(default)]
    pub payload: Value,

    #[serde(default)]
    pub severity: Severity,

    /// Defaults to the publisher's source when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, Value>,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
}

impl EventInput {
    pub fn new(kind: impl Into<EventKind>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            payload,
            severity: Severity::default(),
            source: None,
            actor_id: None,
            entity_id: None,
            entity_type: None,
            metadata: HashMap::new(),
            tags: BTreeSet::new(),
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Set the user or agent that triggered this event.
    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor_id = Some(actor.into());
        self
    }

    /// Set the entity this event is about.
    pub fn with_entity(mut self, entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.metadata.insert(key.into(), v);
        }
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }
}
