//! Signals delivered to multiplexed subscribers.

use echo_core::{ChangeEvent, ReactionSnapshot};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// What a subscriber is told about its resource
#[derive(Debug, Clone)]
pub enum Signal {
    /// An upstream row changed; the payload is a partial diff, refetch instead
    Remote(ChangeEvent),
    /// The channel is degraded to polling and a refresh is due
    Poll,
    /// A new authoritative (or optimistic) snapshot was produced locally
    Snapshot(Arc<ReactionSnapshot>),
}

impl Signal {
    /// Whether the receiver should refetch from the source of truth
    #[must_use]
    pub fn requires_refetch(&self) -> bool {
        matches!(self, Self::Remote(_) | Self::Poll)
    }
}

/// Callback registered with the multiplexer
pub type SignalCallback = Arc<dyn Fn(&Signal) + Send + Sync>;

/// Identifier of one registration, increasing in registration order
pub type SubscriberId = u64;

/// Ordered subscriber set shared between a subscription entry and its channel task
#[derive(Clone, Default)]
pub(crate) struct Listeners(Arc<Mutex<BTreeMap<SubscriberId, SignalCallback>>>);

impl Listeners {
    pub(crate) fn insert(&self, id: SubscriberId, callback: SignalCallback) {
        self.0.lock().insert(id, callback);
    }

    /// Remove a registration; returns true when the set is now empty
    pub(crate) fn remove(&self, id: SubscriberId) -> bool {
        let mut callbacks = self.0.lock();
        callbacks.remove(&id);
        callbacks.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.0.lock().len()
    }

    /// Invoke every callback in registration order
    ///
    /// Callbacks run outside the lock so they may subscribe or unsubscribe.
    pub(crate) fn fan_out(&self, signal: &Signal) -> usize {
        let callbacks: Vec<SignalCallback> = self.0.lock().values().cloned().collect();
        for callback in &callbacks {
            callback(signal);
        }
        callbacks.len()
    }
}
