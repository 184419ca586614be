#![allow(clippy::result_large_err)]
//! # Vigil Core
//!
//! Real-time state core of the compliance dashboard.
//!
//! ## Architecture
//!
//! - **Events**: Typed event bus with bounded history and wildcard subscribers
//! - **Connection**: Self-healing WebSocket link with heartbeat and linear backoff
//! - **Cache**: TTL cache with insertion-order eviction
//! - **Monitor**: Sliding-window latency, error rate and cache hit rate
//! - **Config**: Dashboard settings tree with merge, validation and atomic swap
//! - **Coordinator**: Snapshot loading, actions, periodic refresh and live updates
//! - **Telemetry**: Structured logging and Prometheus metrics
//!
//! ## Example
//!
//! ```rust,no_run
//! use vigil_core::prelude::*;
//!
//! # async fn run() -> vigil_core::Result<()> {
//! let settings = Settings::load()?;
//! let services = SharedServices::from_settings(&settings);
//! let coordinator = StateCoordinator::from_settings(&settings, services.clone(), ConfigManager::new())?;
//!
//! let _updates = services.bus.subscribe(Topic::All, |event| {
//!     println!("{} {}", event.kind, event.id);
//! });
//!
//! coordinator.start().await?;
//! coordinator.execute_action("run_assessment", serde_json::json!({ "framework": "SOC2" })).await?;
//! coordinator.stop().await;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod cache;
pub mod config;
pub mod connection;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod monitor;
pub mod settings;
pub mod telemetry;

pub use error::{ErrorCode, ErrorContext, ErrorDetails, ErrorSeverity, Result, VigilError};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::api::{ActionResult, Backend, HttpBackend};
    pub use crate::cache::{CacheStats, CacheStore};
    pub use crate::config::{merge_config, validate_config, Config, ConfigManager, ValidationReport};
    pub use crate::connection::{
        ConnectionCallbacks, ConnectionManager, ConnectionOptions, ConnectionState, Transport,
        WsTransport,
    };
    pub use crate::coordinator::{CoordinatorOptions, DashboardSnapshot, SharedServices, StateCoordinator};
    pub use crate::error::{ErrorCode, ErrorContext, ErrorDetails, ErrorSeverity, Result, VigilError};
    pub use crate::events::{
        Event, EventBus, EventId, EventInput, EventKind, HistoryFilter, Severity, Subscription, Topic,
    };
    pub use crate::monitor::{MetricsSnapshot, PerformanceMonitor};
    pub use crate::settings::Settings;
    pub use crate::telemetry::{init_telemetry, TelemetryConfig, TelemetryHandle};
}
