//! Tripbell configuration system.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, TripbellError};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TripbellConfig {
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub freshness: FreshnessConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

impl TripbellConfig {
    /// Load config from the default path (~/.tripbell/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TripbellError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| TripbellError::Config(format!("Failed to parse config: {e}")))
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Tripbell home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".tripbell")
    }

    /// Apply `TRIPBELL_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("TRIPBELL_ROUTING_URL") {
            self.routing.base_url = url;
        }
        if let Some(url) = lookup("TRIPBELL_SOURCE_URL") {
            self.routing.source_url = url;
        }
        if let Some(path) = lookup("TRIPBELL_DB_PATH") {
            self.store.path = path;
        }
    }

    /// Reject values the scheduler cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.scheduler.queue_capacity == 0 {
            return Err(TripbellError::Config("scheduler.queue_capacity must be > 0".into()));
        }
        if self.scheduler.alert_interval_secs == 0 || self.freshness.interval_secs == 0 {
            return Err(TripbellError::Config("tick intervals must be > 0".into()));
        }
        if self.freshness.trip_refresh_timeout_secs == 0 {
            return Err(TripbellError::Config(
                "freshness.trip_refresh_timeout_secs must be > 0".into(),
            ));
        }
        let f = &self.freshness;
        if f.window_start_hour >= f.window_end_hour || f.window_end_hour > 24 {
            return Err(TripbellError::Config(format!(
                "invalid freshness window {}..{}",
                f.window_start_hour, f.window_end_hour
            )));
        }
        if self.routing.base_url.trim().is_empty() {
            return Err(TripbellError::Config("routing.base_url is empty".into()));
        }
        Ok(())
    }
}

/// Upstream routing service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default = "default_routing_url")]
    pub base_url: String,
    /// Schedule feed the routing service reloads from when data goes stale.
    #[serde(default)]
    pub source_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_routing_url() -> String { "http://127.0.0.1:3000".into() }
fn default_request_timeout() -> u64 { 30 }

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            base_url: default_routing_url(),
            source_url: String::new(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl RoutingConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Trip database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: String,
}

fn default_store_path() -> String { "~/.tripbell/trips.db".into() }

impl Default for StoreConfig {
    fn default() -> Self {
        Self { path: default_store_path() }
    }
}

/// Alert loop and notification queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_alert_interval")]
    pub alert_interval_secs: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Wait for in-flight notification handlers when stopping.
    #[serde(default)]
    pub await_handlers_on_stop: bool,
}

fn default_alert_interval() -> u64 { 30 }
fn default_queue_capacity() -> usize { 128 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            alert_interval_secs: default_alert_interval(),
            queue_capacity: default_queue_capacity(),
            await_handlers_on_stop: false,
        }
    }
}

/// Stale-data detection and cascade refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreshnessConfig {
    #[serde(default = "default_freshness_interval")]
    pub interval_secs: u64,
    /// First local hour (inclusive) in which staleness is checked.
    #[serde(default = "default_window_start")]
    pub window_start_hour: u32,
    /// Local hour (exclusive) at which the check window closes.
    #[serde(default = "default_window_end")]
    pub window_end_hour: u32,
    /// Data older than this many whole hours is stale.
    #[serde(default = "default_stale_after")]
    pub stale_after_hours: u32,
    #[serde(default = "default_trip_refresh_timeout")]
    pub trip_refresh_timeout_secs: u64,
}

fn default_freshness_interval() -> u64 { 3600 }
fn default_window_start() -> u32 { 6 }
fn default_window_end() -> u32 { 8 }
fn default_stale_after() -> u32 { 23 }
fn default_trip_refresh_timeout() -> u64 { 60 }

impl Default for FreshnessConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_freshness_interval(),
            window_start_hour: default_window_start(),
            window_end_hour: default_window_end(),
            stale_after_hours: default_stale_after(),
            trip_refresh_timeout_secs: default_trip_refresh_timeout(),
        }
    }
}

/// Outbound notification sinks. Empty URLs disable the sink.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default)]
    pub webhook_url: String,
    #[serde(default)]
    pub discord_webhook_url: String,
}
