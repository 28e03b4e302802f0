//! Optimistic mutation engine
//!
//! Owns the cache and multiplexer, applies user actions optimistically and
//! reconciles them against the backend under a per-resource intent version.

mod builder;
mod outcome;
mod reaction_sync;
mod slot;

pub use builder::ReactionSyncBuilder;
pub use outcome::{MutationOutcome, RefreshOutcome};
pub use reaction_sync::ReactionSync;
