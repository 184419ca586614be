//! Process-wide services and coordinator options.

use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheStore, DEFAULT_MAX_SIZE};
use crate::connection::ConnectionOptions;
use crate::events::{EventBus, DEFAULT_HISTORY_CAPACITY};
use crate::monitor::PerformanceMonitor;
use crate::settings::Settings;

/// The bus, cache and monitor every component shares.
///
/// Built once by the host and passed around by `Arc`; it outlives any
/// coordinator start/stop cycle.
#[derive(Debug, Clone)]
pub struct SharedServices {
    pub bus: Arc<EventBus>,
    pub cache: Arc<CacheStore<Value>>,
    pub monitor: Arc<PerformanceMonitor>,
}

impl SharedServices {
    pub fn new(history_capacity: usize, cache_max_size: usize) -> Arc<Self> {
        let monitor = Arc::new(PerformanceMonitor::new());
        let cache = CacheStore::new(cache_max_size).with_monitor(monitor.clone());

        Arc::new(Self {
            bus: Arc::new(EventBus::new(history_capacity)),
            cache: Arc::new(cache),
            monitor,
        })
    }

    pub fn from_settings(settings: &Settings) -> Arc<Self> {
        Self::new(settings.events.history_capacity, settings.cache.max_size)
    }
}

impl Default for SharedServices {
    fn default() -> Self {
        let monitor = Arc::new(PerformanceMonitor::new());
        Self {
            bus: Arc::new(EventBus::new(DEFAULT_HISTORY_CAPACITY)),
            cache: Arc::new(CacheStore::new(DEFAULT_MAX_SIZE).with_monitor(monitor.clone())),
            monitor,
        }
    }
}

/// Coordinator timing and connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorOptions {
    /// Lifetime of the cached dashboard snapshot
    pub snapshot_ttl: Duration,
    /// Fixed refresh cadence; `None` follows `monitoring.monitoringInterval`
    pub refresh_interval: Option<Duration>,
    pub connection: ConnectionOptions,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            snapshot_ttl: Duration::from_secs(60),
            refresh_interval: None,
            connection: ConnectionOptions::default(),
        }
    }
}
