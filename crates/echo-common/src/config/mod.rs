//! Sync layer configuration
//!
//! Cache and realtime tuning, read from `REACTION_*` / `REALTIME_*` variables.

mod app_config;

pub use app_config::{
    AppSettings, CacheConfig, ConfigError, Environment, RealtimeConfig, SyncConfig,
};
