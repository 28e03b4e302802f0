//! # echo-cache
//!
//! Client-side reaction state: the snapshot cache and the realtime
//! subscription multiplexer.
//!
//! ## Features
//!
//! - **Snapshot Cache**: Last fetched counts and user reaction per resource,
//!   served without a round-trip inside a short freshness window
//! - **Multiplexer**: One upstream realtime channel per resource, shared by
//!   every local subscriber with reference counting
//! - **Resilience**: Reconnect with exponential backoff, then degrade to polling
//!
//! ## Example
//!
//! ```ignore
//! use echo_cache::{Multiplexer, MultiplexerConfig, ReactionCache, Signal};
//!
//! let cache = ReactionCache::new_shared(CacheSettings::default());
//! let multiplexer = Multiplexer::new_shared(provider, MultiplexerConfig::default());
//!
//! let subscription = multiplexer.subscribe(&resource_id, |signal| {
//!     if signal.requires_refetch() {
//!         // schedule a refresh
//!     }
//! });
//!
//! // Dropping the guard unsubscribes; the last one closes the channel
//! subscription.release().await;
//! ```

pub mod pubsub;
pub mod store;

// Re-export store types
pub use store::{CacheEntry, CachePin, CacheSettings, ReactionCache, DEFAULT_FRESHNESS_WINDOW};

// Re-export pubsub types
pub use pubsub::{
    ChannelTopic, Multiplexer, MultiplexerConfig, Signal, SignalCallback, SubscriberId,
    Subscription, REACTIONS_TOPIC_PREFIX,
};
