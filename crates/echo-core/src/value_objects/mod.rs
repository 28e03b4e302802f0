//! Value objects - immutable types that represent domain concepts

mod ids;
mod reaction_kind;

pub use ids::{ReactionId, ResourceId, UserId, PROVISIONAL_ID_PREFIX};
pub use reaction_kind::{ReactionKind, ReactionKindParseError};
