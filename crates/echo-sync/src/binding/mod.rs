//! Widget binding

mod handle;

pub use handle::{ReactionHandle, ReactionState};
