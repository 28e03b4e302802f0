//! Domain errors - error types for the domain layer

use thiserror::Error;

use crate::value_objects::ResourceId;

/// Domain layer errors
#[derive(Debug, Error)]
pub enum DomainError {
    // =========================================================================
    // Validation Errors
    // =========================================================================
    #[error("Invalid resource id: {0:?}")]
    InvalidResourceId(String),

    #[error("Invalid reaction kind: {0}")]
    InvalidReactionKind(String),

    // =========================================================================
    // Identity Errors
    // =========================================================================
    #[error("No signed-in user")]
    Unauthenticated,

    // =========================================================================
    // Transport Errors
    // =========================================================================
    #[error("Failed to fetch reactions for {resource_id}: {reason}")]
    FetchFailed {
        resource_id: ResourceId,
        reason: String,
    },

    #[error("Reaction write rejected: {0}")]
    WriteRejected(String),

    #[error("Failed to open realtime channel {topic}: {reason}")]
    ChannelOpenFailed { topic: String, reason: String },

    #[error("Realtime channel closed")]
    ChannelClosed,

    // =========================================================================
    // Infrastructure Errors (wrapped)
    // =========================================================================
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl DomainError {
    /// Get an error code string for logs and diagnostics
    pub fn code(&self) -> &'static str {
        match self {
            // Validation
            Self::InvalidResourceId(_) => "INVALID_RESOURCE_ID",
            Self::InvalidReactionKind(_) => "INVALID_REACTION_KIND",

            // Identity
            Self::Unauthenticated => "UNAUTHENTICATED",

            // Transport
            Self::FetchFailed { .. } => "FETCH_FAILED",
            Self::WriteRejected(_) => "WRITE_REJECTED",
            Self::ChannelOpenFailed { .. } => "CHANNEL_OPEN_FAILED",
            Self::ChannelClosed => "CHANNEL_CLOSED",

            // Infrastructure
            Self::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    /// Create a fetch failure for a resource
    pub fn fetch_failed(resource_id: &ResourceId, reason: impl Into<String>) -> Self {
        Self::FetchFailed {
            resource_id: resource_id.clone(),
            reason: reason.into(),
        }
    }

    /// Create a rejected write error
    pub fn write_rejected(reason: impl Into<String>) -> Self {
        Self::WriteRejected(reason.into())
    }

    /// Create a channel open failure
    pub fn channel_open_failed(topic: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ChannelOpenFailed {
            topic: topic.into(),
            reason: reason.into(),
        }
    }

    /// Check if retrying later may succeed (reads and channel setup)
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::FetchFailed { .. } | Self::ChannelOpenFailed { .. } | Self::ChannelClosed
        )
    }

    /// Check if this is a rejected insert/delete
    pub fn is_write_rejected(&self) -> bool {
        matches!(self, Self::WriteRejected(_))
    }

    /// Check if this concerns the realtime channel
    pub fn is_channel(&self) -> bool {
        matches!(self, Self::ChannelOpenFailed { .. } | Self::ChannelClosed)
    }

    /// Check if this is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidResourceId(_) | Self::InvalidReactionKind(_)
        )
    }
}

impl From<crate::value_objects::ReactionKindParseError> for DomainError {
    fn from(err: crate::value_objects::ReactionKindParseError) -> Self {
        Self::InvalidReactionKind(err.0)
    }
}
