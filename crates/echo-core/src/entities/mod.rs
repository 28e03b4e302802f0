//! Domain entities - core business objects

mod reaction;
mod snapshot;

pub use reaction::{ReactionCount, UserReaction};
pub use snapshot::ReactionSnapshot;
