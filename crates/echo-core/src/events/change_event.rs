//! Realtime change events
//!
//! The realtime transport emits two classes of row change for a resource:
//! individual reaction rows and the aggregate count rows. Payloads are partial
//! diffs in whatever shape the backend uses, so they are kept as raw JSON and
//! consumers refetch instead of applying them.

use serde::{Deserialize, Serialize};

use crate::value_objects::ResourceId;

/// Which table an upstream change touched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventClass {
    /// A reaction row was inserted, updated or deleted
    ReactionRowChanged,
    /// An aggregate count row changed
    AggregateRowChanged,
}

impl EventClass {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ReactionRowChanged => "reaction_row_changed",
            Self::AggregateRowChanged => "aggregate_row_changed",
        }
    }
}

impl std::fmt::Display for EventClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A change notification for one resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub class: EventClass,
    pub resource_id: ResourceId,
    /// Raw partial diff from the transport
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl ChangeEvent {
    pub fn new(class: EventClass, resource_id: ResourceId, payload: serde_json::Value) -> Self {
        Self {
            class,
            resource_id,
            payload,
        }
    }

    pub fn reaction_row(resource_id: ResourceId) -> Self {
        Self::new(EventClass::ReactionRowChanged, resource_id, serde_json::Value::Null)
    }

    pub fn aggregate_row(resource_id: ResourceId) -> Self {
        Self::new(EventClass::AggregateRowChanged, resource_id, serde_json::Value::Null)
    }
}
