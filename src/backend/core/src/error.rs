//! Error handling for Vigil Core.
//!
//! This module provides:
//! - A single error type with machine-readable codes and context chaining
//! - User-friendly messages vs detailed internal messages
//! - Severity classification driving log levels
//! - Error logging with tracing integration
//! - Metrics integration for error tracking
//!
//! # Propagation policy
//!
//! Transport and protocol failures are recovered where they happen (the
//! connection manager reconnects, bad frames are dropped) and are only ever
//! logged. Action failures travel exactly one level up to the caller.
//! Configuration validation failures carry the full list of violations.
//!
//! # Usage
//!
//! ```rust,ignore
//! use vigil_core::error::{VigilError, Result, ErrorContext, ErrorCode};
//!
//! fn load() -> Result<String> {
//!     std::fs::read_to_string("dashboard.json")
//!         .with_error_code(ErrorCode::ConfigurationError)
//! }
//! ```

use metrics::counter;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::{error, warn};

use crate::config::ConfigViolation;

// ═══════════════════════════════════════════════════════════════════════════════
// Result Type Alias
// ═══════════════════════════════════════════════════════════════════════════════

/// A specialized Result type for Vigil operations.
pub type Result<T> = std::result::Result<T, VigilError>;

// ═══════════════════════════════════════════════════════════════════════════════
// Error Codes
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable error codes.
///
/// These codes are stable and can be used by host UIs for programmatic
/// error handling (e.g. choosing which toast to show).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Transport Errors (1000-1099)
    ConnectionFailed,
    ConnectionClosed,

    // Protocol Errors (1100-1199)
    MalformedFrame,
    UnknownMessageType,
    InvalidPayload,

    // Action Errors (1200-1299)
    ActionFailed,
    BackendError,
    BackendUnavailable,

    // Configuration Errors (1300-1399)
    ConfigValidationFailed,
    InvalidConfiguration,
    ConfigurationError,

    // Serialization Errors (2200-2299)
    SerializationError,
    DeserializationError,
    InvalidJson,

    // External Service Errors (3000-3099)
    NetworkError,
    Timeout,

    // Lifecycle Errors (4000-4099)
    CoordinatorStopped,
    AlreadyStarted,

    // Internal Errors (9000-9099)
    InternalError,
}

impl ErrorCode {
    /// Get the numeric code for this error.
    pub const fn numeric_code(&self) -> u32 {
        match self {
            Self::ConnectionFailed => 1000,
            Self::ConnectionClosed => 1001,

            Self::MalformedFrame => 1100,
            Self::UnknownMessageType => 1101,
            Self::InvalidPayload => 1102,

            Self::ActionFailed => 1200,
            Self::BackendError => 1201,
            Self::BackendUnavailable => 1202,

            Self::ConfigValidationFailed => 1300,
            Self::InvalidConfiguration => 1301,
            Self::ConfigurationError => 1302,

            Self::SerializationError => 2200,
            Self::DeserializationError => 2201,
            Self::InvalidJson => 2202,

            Self::NetworkError => 3000,
            Self::Timeout => 3001,

            Self::CoordinatorStopped => 4000,
            Self::AlreadyStarted => 4001,

            Self::InternalError => 9000,
        }
    }

    /// Check if the operation that produced this error may be retried.
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed
                | Self::ConnectionClosed
                | Self::BackendUnavailable
                | Self::NetworkError
                | Self::Timeout
        )
    }

    /// Get the error category.
    pub const fn category(&self) -> &'static str {
        match self.numeric_code() {
            1000..=1099 => "transport",
            1100..=1199 => "protocol",
            1200..=1299 => "action",
            1300..=1399 => "configuration",
            2200..=2299 => "serialization",
            3000..=3099 => "external",
            4000..=4099 => "lifecycle",
            _ => "internal",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Severity
// ═══════════════════════════════════════════════════════════════════════════════

/// Severity level for errors (affects logging).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Caller errors (bad input, rejected configuration)
    Low,
    /// Recoverable operational issues (dropped frames, timeouts)
    Medium,
    /// Failed collaborator calls
    High,
    /// Bugs and unexpected states
    Critical,
}

impl ErrorSeverity {
    /// Get severity based on error code.
    pub const fn from_code(code: &ErrorCode) -> Self {
        match code {
            ErrorCode::ConfigValidationFailed
            | ErrorCode::InvalidConfiguration
            | ErrorCode::CoordinatorStopped
            | ErrorCode::AlreadyStarted => Self::Low,

            ErrorCode::ConnectionFailed
            | ErrorCode::ConnectionClosed
            | ErrorCode::MalformedFrame
            | ErrorCode::UnknownMessageType
            | ErrorCode::InvalidPayload
            | ErrorCode::NetworkError
            | ErrorCode::Timeout => Self::Medium,

            ErrorCode::ActionFailed
            | ErrorCode::BackendError
            | ErrorCode::BackendUnavailable
            | ErrorCode::ConfigurationError
            | ErrorCode::SerializationError
            | ErrorCode::DeserializationError
            | ErrorCode::InvalidJson => Self::High,

            ErrorCode::InternalError => Self::Critical,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Details
// ═══════════════════════════════════════════════════════════════════════════════

/// Additional structured details about an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Additional context key-value pairs
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,

    /// Related entity ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,

    /// Related entity type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,

    /// Every configuration rule the rejected update violated
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<ConfigViolation>,
}

impl ErrorDetails {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entity(mut self, entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.context.insert(key.into(), v);
        }
        self
    }

    pub fn with_violations(mut self, violations: Vec<ConfigViolation>) -> Self {
        self.violations = violations;
        self
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Main Error Type
// ═══════════════════════════════════════════════════════════════════════════════

/// The main error type for Vigil Core.
#[derive(Error, Debug)]
pub struct VigilError {
    /// Machine-readable error code
    code: ErrorCode,

    /// User-friendly error message (safe to show in the host UI)
    user_message: Cow<'static, str>,

    /// Detailed internal message (for logging only)
    internal_message: Option<String>,

    /// Additional structured details
    details: ErrorDetails,

    /// The source error that caused this error
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl fmt::Display for VigilError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.user_message)?;
        if let Some(ref internal) = self.internal_message {
            write!(f, " (internal: {})", internal)?;
        }
        Ok(())
    }
}

impl VigilError {
    // ─────────────────────────────────────────────────────────────────────────
    // Constructors
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a new error with code and user message.
    pub fn new(code: ErrorCode, user_message: impl Into<Cow<'static, str>>) -> Self {
        let error = Self {
            code,
            user_message: user_message.into(),
            internal_message: None,
            details: ErrorDetails::default(),
            source: None,
        };
        error.record_metrics();
        error
    }

    /// Create an error with both user and internal messages.
    pub fn with_internal(
        code: ErrorCode,
        user_message: impl Into<Cow<'static, str>>,
        internal_message: impl Into<String>,
    ) -> Self {
        let mut error = Self::new(code, user_message);
        error.internal_message = Some(internal_message.into());
        error
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::with_internal(ErrorCode::InternalError, "An internal error occurred", message)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Builder Methods
    // ─────────────────────────────────────────────────────────────────────────

    /// Add a source error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Add error details.
    pub fn with_details(mut self, details: ErrorDetails) -> Self {
        self.details = details;
        self
    }

    /// Add internal message.
    pub fn with_internal_message(mut self, message: impl Into<String>) -> Self {
        self.internal_message = Some(message.into());
        self
    }

    /// Add context to details.
    pub fn with_context(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.details.context.insert(key.into(), v);
        }
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    pub fn internal_message(&self) -> Option<&str> {
        self.internal_message.as_deref()
    }

    pub fn details(&self) -> &ErrorDetails {
        &self.details
    }

    /// Configuration violations carried by a rejected config update.
    pub fn violations(&self) -> &[ConfigViolation] {
        &self.details.violations
    }

    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    pub fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::from_code(&self.code)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Logging
    // ─────────────────────────────────────────────────────────────────────────

    /// Log this error with appropriate severity.
    pub fn log(&self) {
        let code = self.code.to_string();
        let category = self.code.category();

        match self.severity() {
            ErrorSeverity::Critical => {
                error!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    details = ?self.details,
                    source = ?self.source,
                    "CRITICAL ERROR"
                );
            }
            ErrorSeverity::High => {
                error!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    internal_message = ?self.internal_message,
                    "High severity error"
                );
            }
            ErrorSeverity::Medium => {
                warn!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    "Medium severity error"
                );
            }
            ErrorSeverity::Low => {
                tracing::debug!(
                    error_code = %code,
                    category = category,
                    user_message = %self.user_message,
                    "Low severity error"
                );
            }
        }
    }

    fn record_metrics(&self) {
        counter!(
            "vigil_errors_total",
            "code" => self.code.to_string(),
            "category" => self.code.category().to_string(),
            "severity" => format!("{:?}", self.severity()),
        )
        .increment(1);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Error Context Extension Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// Extension trait for adding context to errors.
pub trait ErrorContext<T> {
    /// Add context to an error.
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with error code.
    fn with_error_code(self, code: ErrorCode) -> Result<T>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| VigilError::internal(message.into()).with_source(e))
    }

    fn with_error_code(self, code: ErrorCode) -> Result<T> {
        self.map_err(|e| VigilError::new(code, e.to_string()).with_source(e))
    }
}

impl<T> ErrorContext<T> for Option<T> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.ok_or_else(|| VigilError::internal(message.into()))
    }

    fn with_error_code(self, code: ErrorCode) -> Result<T> {
        self.ok_or_else(|| VigilError::new(code, "Value not present"))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// From Implementations
// ═══════════════════════════════════════════════════════════════════════════════

impl From<serde_json::Error> for VigilError {
    fn from(error: serde_json::Error) -> Self {
        use serde_json::error::Category;

        let code = match error.classify() {
            Category::Syntax | Category::Eof => ErrorCode::InvalidJson,
            Category::Data => ErrorCode::DeserializationError,
            Category::Io => ErrorCode::SerializationError,
        };

        Self::with_internal(code, "Failed to process JSON data", error.to_string()).with_source(error)
    }
}

impl From<reqwest::Error> for VigilError {
    fn from(error: reqwest::Error) -> Self {
        let (code, message) = if error.is_timeout() {
            (ErrorCode::Timeout, "Backend request timed out")
        } else if error.is_connect() {
            (ErrorCode::BackendUnavailable, "Failed to connect to backend")
        } else if error.is_decode() {
            (ErrorCode::DeserializationError, "Failed to decode backend response")
        } else if error.is_status() {
            (ErrorCode::BackendError, "Backend returned an error status")
        } else {
            (ErrorCode::NetworkError, "Network error")
        };

        let mut err = Self::with_internal(code, message, error.to_string());
        if let Some(url) = error.url() {
            err = err.with_context("url", url.as_str());
        }
        if let Some(status) = error.status() {
            err = err.with_context("status", status.as_u16());
        }
        err.with_source(error)
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for VigilError {
    fn from(error: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;

        let code = match &error {
            WsError::ConnectionClosed | WsError::AlreadyClosed => ErrorCode::ConnectionClosed,
            WsError::Protocol(_) => ErrorCode::MalformedFrame,
            _ => ErrorCode::ConnectionFailed,
        };

        Self::with_internal(code, "WebSocket transport error", error.to_string()).with_source(error)
    }
}

impl From<std::io::Error> for VigilError {
    fn from(error: std::io::Error) -> Self {
        let code = match error.kind() {
            std::io::ErrorKind::TimedOut => ErrorCode::Timeout,
            std::io::ErrorKind::ConnectionRefused
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted => ErrorCode::ConnectionFailed,
            _ => ErrorCode::InternalError,
        };

        Self::with_internal(code, "I/O error", error.to_string()).with_source(error)
    }
}

impl From<anyhow::Error> for VigilError {
    fn from(error: anyhow::Error) -> Self {
        Self::with_internal(
            ErrorCode::InternalError,
            "An internal error occurred",
            format!("{:#}", error),
        )
    }
}

impl From<config::ConfigError> for VigilError {
    fn from(error: config::ConfigError) -> Self {
        let code = match &error {
            config::ConfigError::NotFound(_) | config::ConfigError::FileParse { .. } => {
                ErrorCode::ConfigurationError
            }
            config::ConfigError::Type { .. } => ErrorCode::InvalidConfiguration,
            _ => ErrorCode::ConfigurationError,
        };

        Self::with_internal(code, "Configuration error", error.to_string()).with_source(error)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Domain-Specific Constructors
// ═══════════════════════════════════════════════════════════════════════════════

impl VigilError {
    /// A collaborator call behind `execute_action` failed.
    pub fn action_failed(action: impl Into<String>, reason: impl Into<String>) -> Self {
        let action = action.into();
        Self::with_internal(
            ErrorCode::ActionFailed,
            format!("Action '{}' failed", action),
            reason,
        )
        .with_details(ErrorDetails::new().with_entity("action", action))
    }

    /// A configuration update broke one or more rules.
    pub fn config_validation(violations: Vec<ConfigViolation>) -> Self {
        let summary = violations
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        Self::with_internal(
            ErrorCode::ConfigValidationFailed,
            format!("Configuration rejected: {} violation(s)", violations.len()),
            summary,
        )
        .with_details(ErrorDetails::new().with_violations(violations))
    }

    /// An inbound frame could not be parsed.
    pub fn malformed_frame(reason: impl Into<String>) -> Self {
        Self::with_internal(ErrorCode::MalformedFrame, "Malformed inbound frame", reason)
    }

    /// A well-formed frame whose `type` is not handled.
    pub fn unknown_message_type(kind: impl Into<String>) -> Self {
        let kind = kind.into();
        Self::with_internal(
            ErrorCode::UnknownMessageType,
            "Unknown inbound message type",
            format!("type '{}'", kind),
        )
        .with_context("type", kind)
    }

    /// The coordinator was torn down while work was in flight.
    pub fn coordinator_stopped() -> Self {
        Self::new(ErrorCode::CoordinatorStopped, "Coordinator has been stopped")
    }

    /// A configuration file or environment value was unusable.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::with_internal(
            ErrorCode::ConfigurationError,
            "Configuration error",
            message,
        )
    }
}
