//! Reaction snapshot storage.

mod reaction_cache;

pub use reaction_cache::{
    CacheEntry, CachePin, CacheSettings, ReactionCache, DEFAULT_FRESHNESS_WINDOW,
};
