//! Engine wiring
//!
//! Collects the collaborators and configuration and assembles a
//! [`ReactionSync`] with its own cache and multiplexer.

use echo_cache::{CacheSettings, Multiplexer, MultiplexerConfig, ReactionCache};
use echo_common::{AppError, AppResult, ConfigError, SyncConfig};
use echo_core::{IdentityProvider, RealtimeProvider, ReactionReader, ReactionWriter};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::reaction_sync::ReactionSync;

/// Builder for [`ReactionSync`]
#[derive(Default)]
pub struct ReactionSyncBuilder {
    identity: Option<Arc<dyn IdentityProvider>>,
    reader: Option<Arc<dyn ReactionReader>>,
    writer: Option<Arc<dyn ReactionWriter>>,
    realtime: Option<Arc<dyn RealtimeProvider>>,
    config: SyncConfig,
    sweep_interval: Option<Duration>,
}

impl ReactionSyncBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the identity provider
    pub fn identity(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        self.identity = Some(identity);
        self
    }

    /// Set the aggregate reader
    pub fn reader(mut self, reader: Arc<dyn ReactionReader>) -> Self {
        self.reader = Some(reader);
        self
    }

    /// Set the mutation writer
    pub fn writer(mut self, writer: Arc<dyn ReactionWriter>) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Use one backend for both reads and writes
    pub fn backend<B>(mut self, backend: Arc<B>) -> Self
    where
        B: ReactionReader + ReactionWriter + 'static,
    {
        self.reader = Some(backend.clone());
        self.writer = Some(backend);
        self
    }

    /// Set the realtime provider
    pub fn realtime(mut self, realtime: Arc<dyn RealtimeProvider>) -> Self {
        self.realtime = Some(realtime);
        self
    }

    /// Set the configuration
    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Periodically drop cache entries older than the configured max age
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    /// Build the engine
    ///
    /// # Errors
    /// Returns an error if a collaborator is missing, the configuration is
    /// invalid, or a sweeper is requested outside a tokio runtime
    pub fn build(self) -> AppResult<Arc<ReactionSync>> {
        self.config.validate()?;

        let identity = self
            .identity
            .ok_or_else(|| AppError::missing("identity provider"))?;
        let reader = self.reader.ok_or_else(|| AppError::missing("reaction reader"))?;
        let writer = self.writer.ok_or_else(|| AppError::missing("reaction writer"))?;
        let realtime = self
            .realtime
            .ok_or_else(|| AppError::missing("realtime provider"))?;

        let cache = ReactionCache::new_shared(CacheSettings::from(&self.config.cache));
        let multiplexer =
            Multiplexer::new_shared(realtime, MultiplexerConfig::from(&self.config.realtime));

        let sweeper = match self.sweep_interval {
            Some(interval) if interval.is_zero() => {
                return Err(ConfigError::InvalidValue(
                    "sweep_interval",
                    "must be greater than zero".to_string(),
                )
                .into());
            }
            Some(interval) => {
                tokio::runtime::Handle::try_current().map_err(AppError::internal)?;
                Some(cache.spawn_sweeper(interval))
            }
            None => None,
        };

        info!(
            app = %self.config.app.name,
            env = ?self.config.app.env,
            freshness_ms = self.config.cache.freshness_ms,
            max_entries = self.config.cache.max_entries,
            sweeper = sweeper.is_some(),
            "Reaction sync initialized"
        );

        Ok(Arc::new(ReactionSync::from_parts(
            identity,
            reader,
            writer,
            cache,
            multiplexer,
            sweeper,
        )))
    }
}

impl std::fmt::Debug for ReactionSyncBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactionSyncBuilder")
            .field("identity", &self.identity.is_some())
            .field("reader", &self.reader.is_some())
            .field("writer", &self.writer.is_some())
            .field("realtime", &self.realtime.is_some())
            .field("config", &self.config)
            .field("sweep_interval", &self.sweep_interval)
            .finish()
    }
}
