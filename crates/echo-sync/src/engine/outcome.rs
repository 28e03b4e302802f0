//! Results of user actions and refreshes.
//!
//! None of these are errors. They tell the caller what ended up on screen.

use echo_core::ReactionSnapshot;
use std::fmt;

/// How a reaction mutation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationOutcome {
    /// Write succeeded and the server state was applied
    Confirmed,
    /// Write succeeded but the reconciliation fetch failed; optimistic state stays
    Unconfirmed,
    /// Write failed and the prior state was restored
    RolledBack,
    /// A newer action on the same resource took over before this one settled
    Superseded,
    /// Nothing to do (no signed-in user, kind already held, nothing to remove)
    Skipped,
}

impl MutationOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Unconfirmed => "unconfirmed",
            Self::RolledBack => "rolled_back",
            Self::Superseded => "superseded",
            Self::Skipped => "skipped",
        }
    }

    /// Whether the server accepted the write
    pub fn is_written(&self) -> bool {
        matches!(self, Self::Confirmed | Self::Unconfirmed)
    }
}

impl fmt::Display for MutationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a refresh request ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Served from a fresh cache entry without a fetch
    Cached(ReactionSnapshot),
    /// Fetched and applied
    Fetched(ReactionSnapshot),
    /// Fetched, but a local action happened meanwhile so the result was dropped
    Discarded,
    /// Another fetch was already running for the resource
    Coalesced,
    /// The fetch failed; prior state kept
    Failed,
}

impl RefreshOutcome {
    /// Snapshot produced by this request, if any
    pub fn snapshot(&self) -> Option<&ReactionSnapshot> {
        match self {
            Self::Cached(snapshot) | Self::Fetched(snapshot) => Some(snapshot),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }
}
