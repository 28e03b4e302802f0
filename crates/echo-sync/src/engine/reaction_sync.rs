//! Optimistic reaction mutation engine
//!
//! Applies a user's action locally first, sends the write, then replaces the
//! optimistic state with the server's answer (or rolls it back). Every action
//! bumps a per-resource intent version; a result is only applied while its
//! intent is still the latest one.

use dashmap::DashMap;
use echo_cache::{Multiplexer, ReactionCache, Signal};
use echo_core::{
    DomainError, IdentityProvider, ReactionKind, ReactionReader, ReactionSnapshot, ReactionWriter,
    ResourceId, TransportResult, UserId, UserReaction,
};
use futures::future::try_join;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, trace, warn};

use super::builder::ReactionSyncBuilder;
use super::outcome::{MutationOutcome, RefreshOutcome};
use super::slot::ResourceSlot;
use crate::binding::ReactionHandle;

/// Reaction synchronization engine
///
/// Owns the snapshot cache and the subscription multiplexer. Create one per
/// process (or per test) with [`ReactionSync::builder`].
pub struct ReactionSync {
    identity: Arc<dyn IdentityProvider>,
    reader: Arc<dyn ReactionReader>,
    writer: Arc<dyn ReactionWriter>,
    cache: Arc<ReactionCache>,
    multiplexer: Arc<Multiplexer>,
    slots: DashMap<ResourceId, Arc<ResourceSlot>>,
    sweeper: Option<JoinHandle<()>>,
}

impl ReactionSync {
    /// Start building an engine
    pub fn builder() -> ReactionSyncBuilder {
        ReactionSyncBuilder::new()
    }

    pub(crate) fn from_parts(
        identity: Arc<dyn IdentityProvider>,
        reader: Arc<dyn ReactionReader>,
        writer: Arc<dyn ReactionWriter>,
        cache: Arc<ReactionCache>,
        multiplexer: Arc<Multiplexer>,
        sweeper: Option<JoinHandle<()>>,
    ) -> Self {
        Self {
            identity,
            reader,
            writer,
            cache,
            multiplexer,
            slots: DashMap::new(),
            sweeper,
        }
    }

    // === Accessors ===

    pub fn cache(&self) -> &Arc<ReactionCache> {
        &self.cache
    }

    pub fn multiplexer(&self) -> &Arc<Multiplexer> {
        &self.multiplexer
    }

    /// Latest intent version for a resource (0 before any action)
    pub fn intent_version(&self, resource_id: &ResourceId) -> u64 {
        self.slots
            .get(resource_id)
            .map_or(0, |slot| slot.intent_version())
    }

    /// Actions applied locally that are still writing or reconciling
    pub fn pending_writes(&self, resource_id: &ResourceId) -> usize {
        self.slots
            .get(resource_id)
            .map_or(0, |slot| slot.pending_writes())
    }

    /// Best-known state for a resource, fresh or not
    pub fn snapshot(&self, resource_id: &ResourceId) -> ReactionSnapshot {
        self.cache
            .peek(resource_id)
            .map_or_else(|| ReactionSnapshot::empty(resource_id.clone()), |entry| entry.snapshot)
    }

    /// Bind a widget to a resource
    ///
    /// Must be called from within a tokio runtime.
    pub fn watch(self: &Arc<Self>, resource_id: &ResourceId) -> ReactionHandle {
        ReactionHandle::attach(self, resource_id)
    }

    // === Mutations ===

    /// Set the signed-in user's reaction on a resource
    ///
    /// Replaces a different kind the user already holds. Selecting the held
    /// kind again does nothing.
    #[instrument(skip(self))]
    pub async fn add_reaction(&self, resource_id: &ResourceId, kind: ReactionKind) -> MutationOutcome {
        let Some(user_id) = self.identity.current_user_id() else {
            warn!(resource_id = %resource_id, "No signed-in user, ignoring reaction");
            return MutationOutcome::Skipped;
        };

        let slot = self.slot(resource_id);
        let began = slot.begin_intent(|version| {
            let before = self.snapshot(resource_id);
            if before.user_kind() == Some(kind) {
                return None;
            }

            let provisional = UserReaction::provisional(resource_id.clone(), user_id.clone(), kind);
            self.apply(before.with_user_reaction(provisional));

            debug!(
                resource_id = %resource_id,
                kind = %kind,
                intent = version,
                "Applied optimistic reaction"
            );
            Some(before)
        });

        let Some((ticket, version, before)) = began else {
            debug!(resource_id = %resource_id, kind = %kind, "Reaction already held");
            return MutationOutcome::Skipped;
        };

        let written = {
            let _lane = slot.write_lane.lock().await;
            self.write_add(resource_id, &user_id, kind, before.user_reaction.as_ref())
                .await
        };

        let outcome = match written {
            Ok(()) => {
                info!(
                    resource_id = %resource_id,
                    user_id = %user_id,
                    kind = %kind,
                    "Reaction added"
                );
                self.reconcile(resource_id, &user_id, &slot, version).await
            }
            Err(e) => {
                self.roll_back(resource_id, &user_id, &slot, version, Some(before), &e)
                    .await
            }
        };
        drop(ticket);
        outcome
    }

    /// Retire the signed-in user's reaction on a resource
    #[instrument(skip(self))]
    pub async fn remove_reaction(&self, resource_id: &ResourceId) -> MutationOutcome {
        let Some(user_id) = self.identity.current_user_id() else {
            warn!(resource_id = %resource_id, "No signed-in user, ignoring reaction removal");
            return MutationOutcome::Skipped;
        };

        let slot = self.slot(resource_id);
        let began = slot.begin_intent(|version| {
            let known = self.cache.peek(resource_id).map(|entry| entry.snapshot);
            match &known {
                Some(before) if before.user_reaction.is_none() => return None,
                Some(before) => {
                    self.apply(before.without_user_reaction());
                    debug!(resource_id = %resource_id, intent = version, "Applied optimistic removal");
                }
                None => {
                    debug!(
                        resource_id = %resource_id,
                        intent = version,
                        "Removing reaction before state is known"
                    );
                }
            }
            Some(known)
        });

        let Some((ticket, version, known)) = began else {
            debug!(resource_id = %resource_id, "No reaction to remove");
            return MutationOutcome::Skipped;
        };

        let written = {
            let _lane = slot.write_lane.lock().await;
            let previous = known.as_ref().and_then(|before| before.user_reaction.as_ref());
            self.write_remove(resource_id, &user_id, previous).await
        };

        let outcome = match written {
            Ok(()) => {
                info!(resource_id = %resource_id, user_id = %user_id, "Reaction removed");
                self.reconcile(resource_id, &user_id, &slot, version).await
            }
            Err(e) => self.roll_back(resource_id, &user_id, &slot, version, known, &e).await,
        };
        drop(ticket);
        outcome
    }

    // === Refresh ===

    /// Queue a forced refresh in response to a realtime signal
    ///
    /// Signals that arrive while one of this engine's own actions is writing
    /// or reconciling are absorbed by that action's reconciliation fetch.
    /// Signals that arrive before a queued refresh has started share it.
    pub(crate) fn schedule_refresh(self: &Arc<Self>, resource_id: &ResourceId) {
        let slot = self.slot(resource_id);
        if slot.pending_writes() > 0 {
            trace!(resource_id = %resource_id, "Change absorbed by pending action");
            return;
        }
        if !slot.queue_refresh() {
            trace!(resource_id = %resource_id, "Refresh already queued");
            return;
        }

        let sync = self.clone();
        let resource_id = resource_id.clone();
        tokio::spawn(async move {
            slot.take_queued_refresh();
            sync.force_refresh(&resource_id).await;
        });
    }

    /// Load state for a resource, using the cache while it is fresh
    #[instrument(skip(self))]
    pub async fn refresh(&self, resource_id: &ResourceId) -> RefreshOutcome {
        if let Some(entry) = self.cache.get(resource_id) {
            trace!(resource_id = %resource_id, "Serving reactions from cache");
            return RefreshOutcome::Cached(entry.snapshot);
        }
        self.fetch_coalesced(resource_id, false).await
    }

    /// Refetch state for a resource regardless of the cache
    ///
    /// Called when the realtime channel reports a change or a poll tick fires.
    #[instrument(skip(self))]
    pub async fn force_refresh(&self, resource_id: &ResourceId) -> RefreshOutcome {
        self.fetch_coalesced(resource_id, true).await
    }

    async fn fetch_coalesced(&self, resource_id: &ResourceId, forced: bool) -> RefreshOutcome {
        let slot = self.slot(resource_id);
        let Some(mut claim) = slot.try_start_refresh(forced) else {
            trace!(resource_id = %resource_id, forced = forced, "Refresh already in flight");
            return RefreshOutcome::Coalesced;
        };

        loop {
            let outcome = self.fetch_once(resource_id, &slot).await;
            if !claim.take_follow_up() {
                return outcome;
            }
            debug!(resource_id = %resource_id, "Running follow-up refresh");
        }
    }

    async fn fetch_once(&self, resource_id: &ResourceId, slot: &ResourceSlot) -> RefreshOutcome {
        let version = slot.intent_version();
        let user_id = self.identity.current_user_id();

        match self.fetch_snapshot(resource_id, user_id.as_ref()).await {
            Ok(snapshot) => {
                if slot.if_quiet(version, || self.apply(snapshot.clone())) {
                    debug!(resource_id = %resource_id, total = snapshot.total(), "Refreshed reactions");
                    RefreshOutcome::Fetched(snapshot)
                } else {
                    debug!(resource_id = %resource_id, "Discarding refresh that overlapped a local action");
                    RefreshOutcome::Discarded
                }
            }
            Err(e) => {
                warn!(
                    resource_id = %resource_id,
                    error = %e,
                    code = e.code(),
                    "Reaction refresh failed, keeping prior state"
                );
                RefreshOutcome::Failed
            }
        }
    }

    // === Internals ===

    fn slot(&self, resource_id: &ResourceId) -> Arc<ResourceSlot> {
        self.slots.entry(resource_id.clone()).or_default().clone()
    }

    /// Store a snapshot and fan it out to every subscriber of its resource
    fn apply(&self, snapshot: ReactionSnapshot) {
        let resource_id = snapshot.resource_id.clone();
        let entry = self.cache.put_snapshot(snapshot);
        let delivered = self
            .multiplexer
            .publish(&resource_id, &Signal::Snapshot(Arc::new(entry.snapshot)));

        trace!(resource_id = %resource_id, delivered = delivered, "Published reaction snapshot");
    }

    async fn fetch_snapshot(
        &self,
        resource_id: &ResourceId,
        user_id: Option<&UserId>,
    ) -> TransportResult<ReactionSnapshot> {
        let counts = self.reader.fetch_counts(resource_id);
        let (counts, user_reaction) = match user_id {
            Some(user_id) => {
                try_join(counts, self.reader.fetch_user_reaction(resource_id, user_id)).await?
            }
            None => (counts.await?, None),
        };

        Ok(ReactionSnapshot::new(resource_id.clone(), counts, user_reaction))
    }

    /// Server row behind the reaction being retired
    ///
    /// A provisional reaction has no server id yet; by the time the write lane
    /// reaches it the earlier insert has completed, so look it up. A missing
    /// local reaction is looked up too, since the cached state may be absent
    /// or not yet loaded.
    async fn resolve_previous(
        &self,
        resource_id: &ResourceId,
        user_id: &UserId,
        previous: Option<&UserReaction>,
    ) -> TransportResult<Option<UserReaction>> {
        match previous {
            Some(reaction) if !reaction.is_provisional() => Ok(Some(reaction.clone())),
            _ => self.reader.fetch_user_reaction(resource_id, user_id).await,
        }
    }

    async fn write_add(
        &self,
        resource_id: &ResourceId,
        user_id: &UserId,
        kind: ReactionKind,
        previous: Option<&UserReaction>,
    ) -> TransportResult<()> {
        if let Some(previous) = self.resolve_previous(resource_id, user_id, previous).await? {
            if previous.is_kind(kind) {
                return Ok(());
            }
            self.writer.delete_reaction(&previous.id).await?;
        }
        self.writer.insert_reaction(resource_id, user_id, kind).await
    }

    async fn write_remove(
        &self,
        resource_id: &ResourceId,
        user_id: &UserId,
        previous: Option<&UserReaction>,
    ) -> TransportResult<()> {
        match self.resolve_previous(resource_id, user_id, previous).await? {
            Some(previous) => self.writer.delete_reaction(&previous.id).await,
            None => Ok(()),
        }
    }

    async fn reconcile(
        &self,
        resource_id: &ResourceId,
        user_id: &UserId,
        slot: &ResourceSlot,
        version: u64,
    ) -> MutationOutcome {
        match self.fetch_snapshot(resource_id, Some(user_id)).await {
            Ok(snapshot) => {
                if slot.if_current(version, || self.apply(snapshot)) {
                    debug!(resource_id = %resource_id, intent = version, "Reconciled reaction state");
                    MutationOutcome::Confirmed
                } else {
                    debug!(resource_id = %resource_id, intent = version, "Discarding stale reconciliation");
                    MutationOutcome::Superseded
                }
            }
            Err(e) => {
                warn!(
                    resource_id = %resource_id,
                    error = %e,
                    "Reconciliation fetch failed, keeping optimistic state"
                );
                if slot.intent_version() == version {
                    MutationOutcome::Unconfirmed
                } else {
                    MutationOutcome::Superseded
                }
            }
        }
    }

    async fn roll_back(
        &self,
        resource_id: &ResourceId,
        user_id: &UserId,
        slot: &ResourceSlot,
        version: u64,
        before: Option<ReactionSnapshot>,
        error: &DomainError,
    ) -> MutationOutcome {
        warn!(
            resource_id = %resource_id,
            error = %error,
            code = error.code(),
            "Reaction write failed, rolling back"
        );

        let restored = match self.fetch_snapshot(resource_id, Some(user_id)).await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!(
                    resource_id = %resource_id,
                    error = %e,
                    "Rollback fetch failed, restoring previous snapshot"
                );
                before
            }
        };

        let current = slot.if_current(version, || {
            if let Some(snapshot) = restored {
                self.apply(snapshot);
            }
        });
        if current {
            MutationOutcome::RolledBack
        } else {
            debug!(resource_id = %resource_id, intent = version, "Discarding stale rollback");
            MutationOutcome::Superseded
        }
    }
}

impl Drop for ReactionSync {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
    }
}

impl std::fmt::Debug for ReactionSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactionSync")
            .field("cached", &self.cache.len())
            .field("channels", &self.multiplexer.channel_count())
            .field("slots", &self.slots.len())
            .finish()
    }
}
