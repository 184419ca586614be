//! Infrastructure settings.
//!
//! Endpoints, buffer sizes and timings, loaded from an optional file plus
//! `VIGIL__`-prefixed environment variables (`VIGIL__CONNECTION__URL`,
//! `VIGIL__CACHE__SNAPSHOT_TTL=90s`). A `.env` file is honoured. Every field
//! has a default, so an empty source yields a usable configuration.
//!
//! The dashboard settings tree lives in [`crate::config`].

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::connection::ConnectionOptions;
use crate::coordinator::CoordinatorOptions;
use crate::error::Result;
use crate::telemetry::TelemetryConfig;

const ENV_PREFIX: &str = "VIGIL";
const ENV_SEPARATOR: &str = "__";

/// Main infrastructure configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    /// REST collaborator
    #[serde(default)]
    pub api: ApiSettings,

    /// Real-time WebSocket link
    #[serde(default)]
    pub connection: ConnectionSettings,

    #[serde(default)]
    pub events: EventSettings,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub coordinator: CoordinatorSettings,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiSettings {
    /// Base URL the REST paths are joined onto
    #[serde(default = "default_api_base_url")]
    pub base_url: String,

    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: default_api_base_url(),
            request_timeout: default_request_timeout(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionSettings {
    #[serde(default = "default_ws_url")]
    pub url: String,

    /// Multiplied by the attempt number to get each backoff delay
    #[serde(default = "default_reconnect_base_delay", with = "humantime_serde")]
    pub reconnect_base_delay: Duration,

    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,

    #[serde(default = "default_heartbeat_interval", with = "humantime_serde")]
    pub heartbeat_interval: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            url: default_ws_url(),
            reconnect_base_delay: default_reconnect_base_delay(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            heartbeat_interval: default_heartbeat_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventSettings {
    /// Events retained in bus history
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    #[serde(default = "default_cache_max_size")]
    pub max_size: usize,

    /// Lifetime of the cached dashboard snapshot
    #[serde(default = "default_snapshot_ttl", with = "humantime_serde")]
    pub snapshot_ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_size: default_cache_max_size(),
            snapshot_ttl: default_snapshot_ttl(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CoordinatorSettings {
    /// Fixed refresh cadence. When unset the dashboard's
    /// `monitoring.monitoringInterval` is used.
    #[serde(default, with = "humantime_serde")]
    pub refresh_interval: Option<Duration>,
}

// Default value functions
fn default_api_base_url() -> String { "http://localhost:8080/api".to_string() }
fn default_request_timeout() -> Duration { Duration::from_secs(30) }
fn default_ws_url() -> String { "ws://localhost:8080/ws".to_string() }
fn default_reconnect_base_delay() -> Duration { Duration::from_secs(1) }
fn default_max_reconnect_attempts() -> u32 { 5 }
fn default_heartbeat_interval() -> Duration { Duration::from_secs(30) }
fn default_history_capacity() -> usize { 1_000 }
fn default_cache_max_size() -> usize { 100 }
fn default_snapshot_ttl() -> Duration { Duration::from_secs(60) }

impl Settings {
    /// Load from `.env` and the environment.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = ::config::Config::builder()
            .add_source(environment())
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Load from a specific file, with the environment layered on top.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = ::config::Config::builder()
            .add_source(::config::File::from(path.as_ref()))
            .add_source(environment())
            .build()?;

        Ok(config.try_deserialize()?)
    }

    pub fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            url: self.connection.url.clone(),
            reconnect_base_delay: self.connection.reconnect_base_delay,
            max_reconnect_attempts: self.connection.max_reconnect_attempts,
            heartbeat_interval: self.connection.heartbeat_interval,
        }
    }

    pub fn coordinator_options(&self) -> CoordinatorOptions {
        CoordinatorOptions {
            snapshot_ttl: self.cache.snapshot_ttl,
            refresh_interval: self.coordinator.refresh_interval,
            connection: self.connection_options(),
        }
    }
}

fn environment() -> ::config::Environment {
    ::config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator(ENV_SEPARATOR)
        .separator(ENV_SEPARATOR)
        .try_parsing(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_settings(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.connection.max_reconnect_attempts, 5);
        assert_eq!(settings.connection.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(settings.events.history_capacity, 1_000);
        assert_eq!(settings.cache.snapshot_ttl, Duration::from_secs(60));
        assert!(settings.coordinator.refresh_interval.is_none());
    }

    #[test]
    fn test_from_file_with_humantime_durations() {
        let file = write_settings(
            r#"
[connection]
url = "wss://dashboard.example.com/ws"
reconnect_base_delay = "250ms"
heartbeat_interval = "10s"

[cache]
max_size = 16

[coordinator]
refresh_interval = "2m"
"#,
        );

        let settings = Settings::from_file(file.path()).unwrap();
        assert_eq!(settings.connection.url, "wss://dashboard.example.com/ws");
        assert_eq!(settings.connection.reconnect_base_delay, Duration::from_millis(250));
        assert_eq!(settings.connection.heartbeat_interval, Duration::from_secs(10));
        assert_eq!(settings.connection.max_reconnect_attempts, 5);
        assert_eq!(settings.cache.max_size, 16);
        assert_eq!(settings.cache.snapshot_ttl, Duration::from_secs(60));
        assert_eq!(settings.coordinator.refresh_interval, Some(Duration::from_secs(120)));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Settings::from_file(dir.path().join("absent.toml")).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::ConfigurationError);
    }

    #[test]
    fn test_options_follow_settings() {
        let mut settings = Settings::default();
        settings.connection.max_reconnect_attempts = 3;
        settings.cache.snapshot_ttl = Duration::from_secs(5);

        let options = settings.coordinator_options();
        assert_eq!(options.snapshot_ttl, Duration::from_secs(5));
        assert_eq!(options.connection.max_reconnect_attempts, 3);
        assert_eq!(options.connection.url, settings.connection.url);
    }

    #[test]
    fn test_zero_heartbeat_is_clamped() {
        let file = write_settings("[connection]\nheartbeat_interval = \"0s\"\n");

        let settings = Settings::from_file(file.path()).unwrap();
        assert_eq!(settings.connection.heartbeat_interval, Duration::ZERO);
        assert_eq!(
            settings.connection_options().heartbeat_period(),
            crate::connection::MIN_HEARTBEAT_INTERVAL
        );
    }
}
