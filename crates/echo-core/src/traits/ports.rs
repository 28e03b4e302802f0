//! Port traits - define the interfaces to external collaborators
//!
//! The sync engine is written against these traits only. Concrete backends
//! (a hosted database, a realtime socket, an auth SDK) and the in-memory fakes
//! used in tests both implement them.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::entities::{ReactionCount, UserReaction};
use crate::error::DomainError;
use crate::events::ChangeEvent;
use crate::value_objects::{ReactionId, ReactionKind, ResourceId, UserId};

/// Result type for transport operations
pub type TransportResult<T> = Result<T, DomainError>;

// ============================================================================
// Identity
// ============================================================================

pub trait IdentityProvider: Send + Sync {
    /// Currently signed-in user, if any
    fn current_user_id(&self) -> Option<UserId>;
}

// ============================================================================
// Aggregate Reads
// ============================================================================

#[async_trait]
pub trait ReactionReader: Send + Sync {
    /// Per-kind counts for a resource
    async fn fetch_counts(&self, resource_id: &ResourceId) -> TransportResult<Vec<ReactionCount>>;

    /// The given user's reaction to a resource
    async fn fetch_user_reaction(
        &self,
        resource_id: &ResourceId,
        user_id: &UserId,
    ) -> TransportResult<Option<UserReaction>>;
}

// ============================================================================
// Mutation Writes
// ============================================================================

#[async_trait]
pub trait ReactionWriter: Send + Sync {
    /// Insert a reaction row for the user
    async fn insert_reaction(
        &self,
        resource_id: &ResourceId,
        user_id: &UserId,
        kind: ReactionKind,
    ) -> TransportResult<()>;

    /// Delete a reaction row by its server id
    async fn delete_reaction(&self, reaction_id: &ReactionId) -> TransportResult<()>;
}

// ============================================================================
// Realtime Channels
// ============================================================================

/// Opaque handle of an open upstream channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelHandle(u64);

impl ChannelHandle {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn into_inner(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ChannelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An open channel: its handle plus the stream of change events
///
/// The provider closes `events` when the upstream connection drops.
#[derive(Debug)]
pub struct RealtimeChannel {
    pub handle: ChannelHandle,
    pub events: mpsc::Receiver<ChangeEvent>,
}

#[async_trait]
pub trait RealtimeProvider: Send + Sync {
    /// Open a channel delivering both event classes for one topic
    async fn open_channel(&self, topic: &str) -> TransportResult<RealtimeChannel>;

    /// Close a previously opened channel
    async fn close_channel(&self, handle: ChannelHandle);
}
