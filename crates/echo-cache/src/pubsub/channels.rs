//! Realtime topic definitions.
//!
//! Defines the topic naming conventions for per-resource change channels.

use echo_core::ResourceId;

/// Topic prefix for per-resource reaction changes
pub const REACTIONS_TOPIC_PREFIX: &str = "reactions:";

/// Upstream realtime topic
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChannelTopic {
    /// Reaction and aggregate row changes for one resource
    Reactions(ResourceId),
    /// Any other topic name
    Custom(String),
}

impl ChannelTopic {
    /// Create the reactions topic for a resource
    #[must_use]
    pub fn reactions(resource_id: &ResourceId) -> Self {
        Self::Reactions(resource_id.clone())
    }

    /// Get the wire topic name
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::Reactions(id) => format!("{REACTIONS_TOPIC_PREFIX}{id}"),
            Self::Custom(name) => name.clone(),
        }
    }

    /// Resource this topic filters on, if any
    #[must_use]
    pub fn resource_id(&self) -> Option<&ResourceId> {
        match self {
            Self::Reactions(id) => Some(id),
            Self::Custom(_) => None,
        }
    }

    /// Parse a topic name back to a `ChannelTopic`
    #[must_use]
    pub fn parse(name: &str) -> Self {
        match name.strip_prefix(REACTIONS_TOPIC_PREFIX) {
            Some(id) if !id.is_empty() => Self::Reactions(ResourceId::from(id)),
            _ => Self::Custom(name.to_string()),
        }
    }
}

impl std::fmt::Display for ChannelTopic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
