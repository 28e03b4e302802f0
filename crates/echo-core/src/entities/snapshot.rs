//! Aggregate state of one resource: per-kind counts plus the user's own reaction
//!
//! Snapshots are immutable values. Optimistic updates produce a new snapshot
//! from an old one instead of mutating shared state in place.

use serde::{Deserialize, Serialize};

use super::{ReactionCount, UserReaction};
use crate::value_objects::{ReactionKind, ResourceId};

/// Counts and the current user's reaction for one resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionSnapshot {
    pub resource_id: ResourceId,
    /// At most one row per kind, ordered by [`ReactionKind::ALL`], no zero rows
    pub counts: Vec<ReactionCount>,
    pub user_reaction: Option<UserReaction>,
}

impl ReactionSnapshot {
    /// Build a snapshot, merging duplicate kinds and dropping zero rows
    pub fn new(
        resource_id: ResourceId,
        counts: Vec<ReactionCount>,
        user_reaction: Option<UserReaction>,
    ) -> Self {
        let mut totals = [0u32; ReactionKind::ALL.len()];
        for row in counts.iter().filter(|row| row.resource_id == resource_id) {
            let slot = &mut totals[row.kind.ordinal()];
            *slot = slot.saturating_add(row.count);
        }

        Self {
            counts: Self::rows_from_totals(&resource_id, &totals),
            resource_id,
            user_reaction,
        }
    }

    /// Snapshot with no reactions at all
    pub fn empty(resource_id: ResourceId) -> Self {
        Self {
            resource_id,
            counts: Vec::new(),
            user_reaction: None,
        }
    }

    /// Count for a single kind (zero when absent)
    pub fn count_of(&self, kind: ReactionKind) -> u32 {
        self.counts
            .iter()
            .find(|row| row.kind == kind)
            .map_or(0, |row| row.count)
    }

    /// Sum over all kinds
    pub fn total(&self) -> u32 {
        self.counts
            .iter()
            .fold(0u32, |sum, row| sum.saturating_add(row.count))
    }

    /// Kind the user currently holds, if any
    pub fn user_kind(&self) -> Option<ReactionKind> {
        self.user_reaction.as_ref().map(|r| r.kind)
    }

    /// Apply the user's reaction locally
    ///
    /// Increments the new kind and, when a different kind was held, decrements
    /// it in the same step. Re-applying the held kind only swaps the record.
    #[must_use]
    pub fn with_user_reaction(&self, reaction: UserReaction) -> Self {
        let mut totals = self.totals();

        match self.user_kind() {
            Some(previous) if previous == reaction.kind => {}
            Some(previous) => {
                let slot = &mut totals[previous.ordinal()];
                *slot = slot.saturating_sub(1);
                let slot = &mut totals[reaction.kind.ordinal()];
                *slot = slot.saturating_add(1);
            }
            None => {
                let slot = &mut totals[reaction.kind.ordinal()];
                *slot = slot.saturating_add(1);
            }
        }

        Self {
            resource_id: self.resource_id.clone(),
            counts: Self::rows_from_totals(&self.resource_id, &totals),
            user_reaction: Some(reaction),
        }
    }

    /// Retire the user's reaction locally
    #[must_use]
    pub fn without_user_reaction(&self) -> Self {
        let mut totals = self.totals();
        if let Some(previous) = self.user_kind() {
            let slot = &mut totals[previous.ordinal()];
            *slot = slot.saturating_sub(1);
        }

        Self {
            resource_id: self.resource_id.clone(),
            counts: Self::rows_from_totals(&self.resource_id, &totals),
            user_reaction: None,
        }
    }

    fn totals(&self) -> [u32; ReactionKind::ALL.len()] {
        let mut totals = [0u32; ReactionKind::ALL.len()];
        for row in &self.counts {
            totals[row.kind.ordinal()] = row.count;
        }
        totals
    }

    fn rows_from_totals(
        resource_id: &ResourceId,
        totals: &[u32; ReactionKind::ALL.len()],
    ) -> Vec<ReactionCount> {
        ReactionKind::ALL
            .iter()
            .zip(totals)
            .filter(|(_, count)| **count > 0)
            .map(|(kind, count)| ReactionCount::new(resource_id.clone(), *kind, *count))
            .collect()
    }
}
