//! Reaction entities - per-kind aggregates and the acting user's own reaction

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{ReactionId, ReactionKind, ResourceId, UserId};

/// Aggregated count for one (resource, kind) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionCount {
    pub resource_id: ResourceId,
    pub kind: ReactionKind,
    pub count: u32,
}

impl ReactionCount {
    /// Create a new ReactionCount
    pub fn new(resource_id: ResourceId, kind: ReactionKind, count: u32) -> Self {
        Self {
            resource_id,
            kind,
            count,
        }
    }
}

/// The acting user's current reaction to a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserReaction {
    pub id: ReactionId,
    pub resource_id: ResourceId,
    pub user_id: UserId,
    pub kind: ReactionKind,
    pub created_at: DateTime<Utc>,
}

impl UserReaction {
    /// Create a confirmed reaction with a server-assigned id
    pub fn new(id: ReactionId, resource_id: ResourceId, user_id: UserId, kind: ReactionKind) -> Self {
        Self {
            id,
            resource_id,
            user_id,
            kind,
            created_at: Utc::now(),
        }
    }

    /// Create a locally generated, unconfirmed reaction
    pub fn provisional(resource_id: ResourceId, user_id: UserId, kind: ReactionKind) -> Self {
        Self::new(ReactionId::provisional(), resource_id, user_id, kind)
    }

    #[inline]
    pub fn is_provisional(&self) -> bool {
        self.id.is_provisional()
    }

    #[inline]
    pub fn is_kind(&self, kind: ReactionKind) -> bool {
        self.kind == kind
    }
}
