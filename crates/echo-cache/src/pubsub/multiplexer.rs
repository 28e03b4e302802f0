//! Realtime subscription multiplexer.
//!
//! Keeps exactly one upstream channel per resource no matter how many local
//! widgets watch it, and fans every signal out to all of them. Subscriptions
//! are RAII guards: dropping one releases it, so an early return or a panic in
//! the owning widget cannot leak the upstream channel. A resource that is
//! resubscribed while its old channel is still closing gets a new task that
//! waits for the old channel to close first.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use echo_core::{ChannelHandle, RealtimeProvider, ResourceId};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use super::channel_task::{ChannelTask, ClosedSignal, MultiplexerConfig};
use super::channels::ChannelTopic;
use super::signal::{Listeners, Signal, SignalCallback, SubscriberId};

/// Per-resource subscription record
///
/// The reference count is the size of the subscriber set; the entry only
/// exists while that count is above zero.
struct SubscriptionEntry {
    listeners: Listeners,
    channel: Arc<Mutex<Option<ChannelHandle>>>,
    shutdown: oneshot::Sender<()>,
    closed: ClosedSignal,
    task: JoinHandle<()>,
}

/// Upstream channel teardown handed back when the last subscriber leaves
struct Teardown {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl Teardown {
    /// Signal the channel task; it closes the upstream channel itself
    fn signal(self) -> JoinHandle<()> {
        let _ = self.shutdown.send(());
        self.task
    }
}

/// Shares one upstream realtime channel per resource among many listeners
pub struct Multiplexer {
    provider: Arc<dyn RealtimeProvider>,
    config: MultiplexerConfig,
    entries: DashMap<ResourceId, SubscriptionEntry>,
    /// Tasks whose last subscriber left, until their channel is closed
    closing: DashMap<ResourceId, ClosedSignal>,
    next_subscriber: AtomicU64,
}

impl Multiplexer {
    /// Create a new multiplexer wrapped in Arc
    #[must_use]
    pub fn new_shared(provider: Arc<dyn RealtimeProvider>, config: MultiplexerConfig) -> Arc<Self> {
        Arc::new(Self {
            provider,
            config,
            entries: DashMap::new(),
            closing: DashMap::new(),
            next_subscriber: AtomicU64::new(1),
        })
    }

    /// Register a callback for a resource
    ///
    /// The first subscriber for a resource starts its upstream channel in the
    /// background; opening failures are retried and never reach the caller.
    /// Must be called from within a tokio runtime.
    pub fn subscribe<F>(self: &Arc<Self>, resource_id: &ResourceId, on_change: F) -> Subscription
    where
        F: Fn(&Signal) + Send + Sync + 'static,
    {
        let callback: SignalCallback = Arc::new(on_change);
        let subscriber_id = self.next_subscriber.fetch_add(1, Ordering::SeqCst);

        match self.entries.entry(resource_id.clone()) {
            Entry::Occupied(entry) => {
                entry.get().listeners.insert(subscriber_id, callback);
                tracing::trace!(
                    resource_id = %resource_id,
                    subscriber_id = subscriber_id,
                    "Joined existing subscription"
                );
            }
            Entry::Vacant(slot) => {
                let listeners = Listeners::default();
                listeners.insert(subscriber_id, callback);
                slot.insert(self.start_channel(resource_id, listeners));
                tracing::debug!(
                    resource_id = %resource_id,
                    subscriber_id = subscriber_id,
                    "Created subscription"
                );
            }
        }

        Subscription {
            multiplexer: Some(Arc::downgrade(self)),
            resource_id: resource_id.clone(),
            subscriber_id,
        }
    }

    /// Deliver a locally produced signal to every subscriber of a resource
    ///
    /// Returns the number of callbacks invoked.
    pub fn publish(&self, resource_id: &ResourceId, signal: &Signal) -> usize {
        let listeners = match self.entries.get(resource_id) {
            Some(entry) => entry.listeners.clone(),
            None => return 0,
        };
        listeners.fan_out(signal)
    }

    /// Number of resources with an active subscription (and so a channel task)
    pub fn channel_count(&self) -> usize {
        self.entries.len()
    }

    /// Current reference count for a resource
    pub fn subscriber_count(&self, resource_id: &ResourceId) -> usize {
        self.entries
            .get(resource_id)
            .map_or(0, |entry| entry.listeners.len())
    }

    /// Whether the upstream channel for a resource is currently open
    pub fn is_connected(&self, resource_id: &ResourceId) -> bool {
        self.entries
            .get(resource_id)
            .is_some_and(|entry| entry.channel.lock().is_some())
    }

    /// Resources with an active subscription
    pub fn resources(&self) -> Vec<ResourceId> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Whether a released channel for a resource has not finished closing
    pub fn is_closing(&self, resource_id: &ResourceId) -> bool {
        self.closing
            .get(resource_id)
            .is_some_and(|closed| !*closed.borrow())
    }

    fn start_channel(&self, resource_id: &ResourceId, listeners: Listeners) -> SubscriptionEntry {
        let channel = Arc::new(Mutex::new(None));
        let (shutdown, shutdown_rx) = oneshot::channel();
        let (closed_tx, closed) = watch::channel(false);
        let predecessor = self
            .closing
            .remove(resource_id)
            .map(|(_, previous)| previous)
            .filter(|previous| !*previous.borrow());

        let task = ChannelTask {
            provider: self.provider.clone(),
            resource_id: resource_id.clone(),
            topic: ChannelTopic::reactions(resource_id).name(),
            config: self.config.clone(),
            listeners: listeners.clone(),
            channel: channel.clone(),
        };

        SubscriptionEntry {
            listeners,
            channel,
            shutdown,
            closed,
            task: tokio::spawn(task.run(shutdown_rx, predecessor, closed_tx)),
        }
    }

    /// Remove one registration, tearing the entry down when it was the last
    fn unsubscribe(&self, resource_id: &ResourceId, subscriber_id: SubscriberId) -> Option<Teardown> {
        match self.entries.entry(resource_id.clone()) {
            Entry::Occupied(entry) => {
                if !entry.get().listeners.remove(subscriber_id) {
                    return None;
                }

                // Record the closing task while the entry is still locked so a
                // concurrent subscribe cannot miss it
                self.closing.retain(|_, previous| !*previous.borrow());
                self.closing
                    .insert(resource_id.clone(), entry.get().closed.clone());

                let SubscriptionEntry { shutdown, task, .. } = entry.remove();

                tracing::debug!(resource_id = %resource_id, "Released last subscriber, closing channel");
                Some(Teardown { shutdown, task })
            }
            Entry::Vacant(_) => None,
        }
    }
}

impl Drop for Multiplexer {
    fn drop(&mut self) {
        for (_, entry) in std::mem::take(&mut self.entries) {
            let _ = entry.shutdown.send(());
        }
    }
}

impl std::fmt::Debug for Multiplexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Multiplexer")
            .field("channels", &self.entries.len())
            .field("config", &self.config)
            .finish()
    }
}

/// Scoped registration with the multiplexer
///
/// Dropping the guard unsubscribes. Use [`Subscription::release`] to also
/// wait until the upstream channel has been closed.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    multiplexer: Option<Weak<Multiplexer>>,
    resource_id: ResourceId,
    subscriber_id: SubscriberId,
}

impl Subscription {
    pub fn resource_id(&self) -> &ResourceId {
        &self.resource_id
    }

    pub fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }

    /// Unsubscribe and, if this was the last subscriber, wait for the channel to close
    pub async fn release(mut self) {
        if let Some(teardown) = self.detach() {
            if let Err(e) = teardown.signal().await {
                tracing::warn!(resource_id = %self.resource_id, error = %e, "Channel task ended abnormally");
            }
        }
    }

    fn detach(&mut self) -> Option<Teardown> {
        let multiplexer = self.multiplexer.take()?.upgrade()?;
        multiplexer.unsubscribe(&self.resource_id, self.subscriber_id)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(teardown) = self.detach() {
            drop(teardown.signal());
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("resource_id", &self.resource_id)
            .field("subscriber_id", &self.subscriber_id)
            .field("active", &self.multiplexer.is_some())
            .finish()
    }
}
