//! Sync engine configuration structs
//!
//! Loads configuration from environment variables (and a `.env` file when present).

use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Main configuration for the reaction sync layer
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub app: AppSettings,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
}

/// General application settings
#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default)]
    pub env: Environment,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            env: Environment::default(),
        }
    }
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "production" => Ok(Self::Production),
            "staging" => Ok(Self::Staging),
            "development" => Ok(Self::Development),
            _ => Err(format!("unknown environment: {s}")),
        }
    }
}

/// Reaction cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// How long a fetched snapshot is served without refetching
    #[serde(default = "default_freshness_ms")]
    pub freshness_ms: u64,
    /// Upper bound on cached resources (least recently stamped evicted first)
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    /// Entries older than this are dropped by the sweeper
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,
}

impl CacheConfig {
    #[must_use]
    pub fn freshness_window(&self) -> Duration {
        Duration::from_millis(self.freshness_ms)
    }

    #[must_use]
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            freshness_ms: default_freshness_ms(),
            max_entries: default_max_entries(),
            max_age_secs: default_max_age_secs(),
        }
    }
}

/// Realtime channel configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    /// First retry delay after a failed channel open
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Cap for the exponential backoff
    #[serde(default = "default_max_reconnect_delay_ms")]
    pub max_reconnect_delay_ms: u64,
    /// Consecutive open failures before falling back to polling
    #[serde(default = "default_max_open_attempts")]
    pub max_open_attempts: u32,
    /// Refresh interval while degraded to polling
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Buffer of the per-channel event queue
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl RealtimeConfig {
    #[must_use]
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    #[must_use]
    pub fn max_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.max_reconnect_delay_ms)
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_reconnect_delay_ms: default_max_reconnect_delay_ms(),
            max_open_attempts: default_max_open_attempts(),
            poll_interval_ms: default_poll_interval_ms(),
            event_buffer: default_event_buffer(),
        }
    }
}

// Default value functions
fn default_app_name() -> String {
    "echo-reactions".to_string()
}

fn default_freshness_ms() -> u64 {
    5_000
}

fn default_max_entries() -> usize {
    512
}

fn default_max_age_secs() -> u64 {
    300 // 5 minutes
}

fn default_reconnect_delay_ms() -> u64 {
    1_000
}

fn default_max_reconnect_delay_ms() -> u64 {
    30_000
}

fn default_max_open_attempts() -> u32 {
    5
}

fn default_poll_interval_ms() -> u64 {
    15_000
}

fn default_event_buffer() -> usize {
    64
}

impl SyncConfig {
    /// Load configuration from environment variables
    ///
    /// Every variable is optional; unset ones fall back to defaults.
    ///
    /// # Errors
    /// Returns an error if a variable is set but cannot be parsed, or the
    /// resulting configuration is invalid
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_source(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup
    pub fn from_source<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            app: AppSettings {
                name: lookup("APP_NAME").unwrap_or_else(default_app_name),
                env: parse_var(&lookup, "APP_ENV")?.unwrap_or_default(),
            },
            cache: CacheConfig {
                freshness_ms: parse_var(&lookup, "REACTION_CACHE_FRESHNESS_MS")?
                    .unwrap_or_else(default_freshness_ms),
                max_entries: parse_var(&lookup, "REACTION_CACHE_MAX_ENTRIES")?
                    .unwrap_or_else(default_max_entries),
                max_age_secs: parse_var(&lookup, "REACTION_CACHE_MAX_AGE_SECS")?
                    .unwrap_or_else(default_max_age_secs),
            },
            realtime: RealtimeConfig {
                reconnect_delay_ms: parse_var(&lookup, "REALTIME_RECONNECT_DELAY_MS")?
                    .unwrap_or_else(default_reconnect_delay_ms),
                max_reconnect_delay_ms: parse_var(&lookup, "REALTIME_MAX_RECONNECT_DELAY_MS")?
                    .unwrap_or_else(default_max_reconnect_delay_ms),
                max_open_attempts: parse_var(&lookup, "REALTIME_MAX_OPEN_ATTEMPTS")?
                    .unwrap_or_else(default_max_open_attempts),
                poll_interval_ms: parse_var(&lookup, "REALTIME_POLL_INTERVAL_MS")?
                    .unwrap_or_else(default_poll_interval_ms),
                event_buffer: parse_var(&lookup, "REALTIME_EVENT_BUFFER")?
                    .unwrap_or_else(default_event_buffer),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.freshness_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "REACTION_CACHE_FRESHNESS_MS",
                "must be greater than zero".to_string(),
            ));
        }
        if self.cache.max_entries == 0 {
            return Err(ConfigError::InvalidValue(
                "REACTION_CACHE_MAX_ENTRIES",
                "must be greater than zero".to_string(),
            ));
        }
        if self.realtime.reconnect_delay_ms > self.realtime.max_reconnect_delay_ms {
            return Err(ConfigError::InvalidValue(
                "REALTIME_RECONNECT_DELAY_MS",
                "must not exceed REALTIME_MAX_RECONNECT_DELAY_MS".to_string(),
            ));
        }
        if self.realtime.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "REALTIME_POLL_INTERVAL_MS",
                "must be greater than zero".to_string(),
            ));
        }
        if self.realtime.event_buffer == 0 {
            return Err(ConfigError::InvalidValue(
                "REALTIME_EVENT_BUFFER",
                "must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue(key, e.to_string())),
        None => Ok(None),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
