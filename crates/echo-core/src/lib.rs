//! # echo-core
//!
//! Domain layer for reaction synchronization: identifiers, reaction entities,
//! realtime change events, and the ports the sync engine talks to.
//! This crate has no dependency on any concrete backend or realtime technology.

pub mod entities;
pub mod error;
pub mod events;
pub mod traits;
pub mod value_objects;

// Re-export commonly used types at crate root
pub use entities::{ReactionCount, ReactionSnapshot, UserReaction};
pub use error::DomainError;
pub use events::{ChangeEvent, EventClass};
pub use traits::{
    ChannelHandle, IdentityProvider, RealtimeChannel, RealtimeProvider, ReactionReader,
    ReactionWriter, TransportResult,
};
pub use value_objects::{
    ReactionId, ReactionKind, ReactionKindParseError, ResourceId, UserId, PROVISIONAL_ID_PREFIX,
};
