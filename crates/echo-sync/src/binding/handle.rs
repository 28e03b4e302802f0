//! Widget binding
//!
//! A [`ReactionHandle`] is what one on-screen reaction widget holds: the
//! current state of one resource, kept up to date through the multiplexer,
//! plus the user actions. Many handles on the same resource share one
//! upstream channel and one cache entry.

use echo_cache::{CachePin, Signal, Subscription};
use echo_core::{ReactionCount, ReactionKind, ReactionSnapshot, ResourceId, UserReaction};
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tracing::trace;

use crate::engine::{MutationOutcome, ReactionSync, RefreshOutcome};

/// What a widget renders
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReactionState {
    pub counts: Vec<ReactionCount>,
    pub user_reaction: Option<UserReaction>,
    /// No answer has arrived yet for this widget
    pub loading: bool,
}

impl ReactionState {
    fn loaded(snapshot: &ReactionSnapshot) -> Self {
        Self {
            counts: snapshot.counts.clone(),
            user_reaction: snapshot.user_reaction.clone(),
            loading: false,
        }
    }

    fn loading_from(snapshot: Option<&ReactionSnapshot>) -> Self {
        match snapshot {
            Some(snapshot) => Self {
                loading: true,
                ..Self::loaded(snapshot)
            },
            None => Self {
                loading: true,
                ..Self::default()
            },
        }
    }

    pub fn count_of(&self, kind: ReactionKind) -> u32 {
        self.counts
            .iter()
            .find(|row| row.kind == kind)
            .map_or(0, |row| row.count)
    }

    pub fn total(&self) -> u32 {
        self.counts
            .iter()
            .fold(0u32, |sum, row| sum.saturating_add(row.count))
    }

    pub fn user_kind(&self) -> Option<ReactionKind> {
        self.user_reaction.as_ref().map(|r| r.kind)
    }

    /// The user's reaction is applied locally but not confirmed yet
    pub fn is_pending(&self) -> bool {
        self.user_reaction
            .as_ref()
            .is_some_and(UserReaction::is_provisional)
    }
}

/// Live binding of one widget to one resource
///
/// Dropping the handle unsubscribes. Results that land afterwards still
/// update the shared cache but no longer reach this handle. While a handle
/// is alive its resource's cache entry is not evicted.
pub struct ReactionHandle {
    sync: Arc<ReactionSync>,
    resource_id: ResourceId,
    state: watch::Receiver<ReactionState>,
    subscription: Subscription,
    _pin: CachePin,
}

impl ReactionHandle {
    pub(crate) fn attach(sync: &Arc<ReactionSync>, resource_id: &ResourceId) -> Self {
        let pin = sync.cache().pin(resource_id);
        let (sender, state) = watch::channel(ReactionState::loading_from(None));
        let sender = Arc::new(sender);

        let subscription = sync.multiplexer().subscribe(
            resource_id,
            on_signal(Arc::downgrade(sync), resource_id.clone(), sender.clone()),
        );

        // Seed after subscribing so a snapshot published in between is not lost
        let fresh = sync.cache().get(resource_id);
        let seed = match &fresh {
            Some(entry) => ReactionState::loaded(&entry.snapshot),
            None => ReactionState::loading_from(
                sync.cache().peek(resource_id).as_ref().map(|entry| &entry.snapshot),
            ),
        };
        sender.send_if_modified(|current| {
            if current.loading {
                *current = seed;
                true
            } else {
                false
            }
        });

        if fresh.is_none() {
            let sync = sync.clone();
            let resource_id = resource_id.clone();
            tokio::spawn(async move {
                let outcome = sync.refresh(&resource_id).await;
                settle_initial_load(&sender, &outcome);
            });
        }

        Self {
            sync: sync.clone(),
            resource_id: resource_id.clone(),
            state,
            subscription,
            _pin: pin,
        }
    }

    pub fn resource_id(&self) -> &ResourceId {
        &self.resource_id
    }

    /// Current state
    pub fn state(&self) -> ReactionState {
        self.state.borrow().clone()
    }

    /// Wait for the next state change
    ///
    /// Returns `None` once no further updates can arrive.
    pub async fn changed(&mut self) -> Option<ReactionState> {
        self.state.changed().await.ok()?;
        Some(self.state.borrow_and_update().clone())
    }

    /// Wait until the first answer for this widget arrived
    pub async fn wait_loaded(&self) -> ReactionState {
        let mut state = self.state.clone();
        let loaded = match state.wait_for(|s| !s.loading).await {
            Ok(loaded) => loaded.clone(),
            Err(_) => self.state(),
        };
        loaded
    }

    pub async fn add_reaction(&self, kind: ReactionKind) -> MutationOutcome {
        self.sync.add_reaction(&self.resource_id, kind).await
    }

    pub async fn remove_reaction(&self) -> MutationOutcome {
        self.sync.remove_reaction(&self.resource_id).await
    }

    /// Toggle `kind`: remove it when held, otherwise switch to it
    pub async fn toggle_reaction(&self, kind: ReactionKind) -> MutationOutcome {
        if self.state().user_kind() == Some(kind) {
            self.remove_reaction().await
        } else {
            self.add_reaction(kind).await
        }
    }

    /// Unsubscribe and wait for the upstream channel to close if this was the last watcher
    pub async fn close(self) {
        self.subscription.release().await;
    }
}

impl std::fmt::Debug for ReactionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactionHandle")
            .field("resource_id", &self.resource_id)
            .field("subscriber_id", &self.subscription.subscriber_id())
            .field("state", &*self.state.borrow())
            .finish()
    }
}

/// Multiplexer callback for one handle
///
/// Snapshots are applied directly. Remote changes and poll ticks schedule a
/// forced refresh, shared by every handle on the resource, whose result comes
/// back as a snapshot.
fn on_signal(
    sync: Weak<ReactionSync>,
    resource_id: ResourceId,
    sender: Arc<watch::Sender<ReactionState>>,
) -> impl Fn(&Signal) + Send + Sync + 'static {
    move |signal| match signal {
        Signal::Snapshot(snapshot) => {
            sender.send_replace(ReactionState::loaded(snapshot));
        }
        Signal::Remote(_) | Signal::Poll => {
            let Some(sync) = sync.upgrade() else {
                return;
            };
            trace!(resource_id = %resource_id, "Change signalled, refreshing");
            sync.schedule_refresh(&resource_id);
        }
    }
}

/// Stop showing a spinner when the initial load could not produce data
fn settle_initial_load(sender: &watch::Sender<ReactionState>, outcome: &RefreshOutcome) {
    match outcome {
        RefreshOutcome::Cached(snapshot) => {
            sender.send_if_modified(|current| {
                if current.loading {
                    *current = ReactionState::loaded(snapshot);
                    true
                } else {
                    false
                }
            });
        }
        RefreshOutcome::Failed => {
            sender.send_if_modified(|current| {
                let was_loading = current.loading;
                current.loading = false;
                was_loading
            });
        }
        RefreshOutcome::Fetched(_) | RefreshOutcome::Discarded | RefreshOutcome::Coalesced => {}
    }
}
