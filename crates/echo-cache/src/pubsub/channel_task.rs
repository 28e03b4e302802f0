//! Background task owning one upstream realtime channel.
//!
//! Opens the channel, pumps its events to the subscriber set, reconnects with
//! exponential backoff, and degrades to polling when the channel cannot be
//! opened at all. The task closes whatever it opened before exiting, and a
//! task started for a resource waits until its predecessor has closed before
//! opening anything.

use echo_common::RealtimeConfig;
use echo_core::{ChangeEvent, ChannelHandle, RealtimeProvider, ResourceId};
use parking_lot::Mutex;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};

use super::signal::{Listeners, Signal};

/// Reconnection and fallback policy for upstream channels
#[derive(Debug, Clone)]
pub struct MultiplexerConfig {
    /// Delay before the first retry
    pub reconnect_delay: Duration,
    /// Upper bound of the exponential backoff
    pub max_reconnect_delay: Duration,
    /// Consecutive open failures before switching to polling
    pub max_open_attempts: u32,
    /// Refresh interval while polling
    pub poll_interval: Duration,
}

impl Default for MultiplexerConfig {
    fn default() -> Self {
        Self::from(&RealtimeConfig::default())
    }
}

impl From<&RealtimeConfig> for MultiplexerConfig {
    fn from(config: &RealtimeConfig) -> Self {
        Self {
            reconnect_delay: config.reconnect_delay(),
            max_reconnect_delay: config.max_reconnect_delay(),
            max_open_attempts: config.max_open_attempts.max(1),
            poll_interval: config.poll_interval(),
        }
    }
}

impl MultiplexerConfig {
    /// Backoff before retry number `attempt` (1-based), without jitter
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.reconnect_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_reconnect_delay)
    }

    fn jittered_delay(&self, attempt: u32) -> Duration {
        let delay = self.backoff_delay(attempt);
        let spread = (delay.as_millis() / 10) as u64;
        if spread == 0 {
            return delay;
        }
        delay + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
    }
}

/// How an event pump ended
enum PumpExit {
    Shutdown,
    StreamEnded,
}

pub(crate) struct ChannelTask {
    pub(crate) provider: Arc<dyn RealtimeProvider>,
    pub(crate) resource_id: ResourceId,
    pub(crate) topic: String,
    pub(crate) config: MultiplexerConfig,
    pub(crate) listeners: Listeners,
    /// Handle of the currently open channel, mirrored for introspection
    pub(crate) channel: Arc<Mutex<Option<ChannelHandle>>>,
}

/// Completion flag of a channel task, set once its channel is closed
pub(crate) type ClosedSignal = watch::Receiver<bool>;

impl ChannelTask {
    /// Run until `shutdown` fires (or its sender is dropped)
    ///
    /// Waits for `predecessor` first and sets `closed` on exit, so at most one
    /// task per resource holds an upstream channel at any time.
    pub(crate) async fn run(
        self,
        shutdown: oneshot::Receiver<()>,
        predecessor: Option<ClosedSignal>,
        closed: watch::Sender<bool>,
    ) {
        if let Some(mut previous) = predecessor {
            if !*previous.borrow() {
                tracing::trace!(topic = %self.topic, "Waiting for previous channel to close");
            }
            // An error means the previous task is gone, which also releases it
            let _ = previous.wait_for(|done| *done).await;
        }

        self.serve(shutdown).await;
        closed.send_replace(true);
    }

    async fn serve(&self, mut shutdown: oneshot::Receiver<()>) {
        let mut failures: u32 = 0;

        loop {
            let opened = tokio::select! {
                biased;
                _ = &mut shutdown => return,
                result = self.provider.open_channel(&self.topic) => result,
            };

            match opened {
                Ok(channel) => {
                    failures = 0;
                    let handle = channel.handle;
                    *self.channel.lock() = Some(handle);

                    tracing::debug!(
                        topic = %self.topic,
                        handle = %handle,
                        "Realtime channel opened"
                    );

                    let exit = self.pump(channel.events, &mut shutdown).await;

                    *self.channel.lock() = None;
                    self.provider.close_channel(handle).await;

                    tracing::debug!(topic = %self.topic, handle = %handle, "Realtime channel closed");

                    match exit {
                        PumpExit::Shutdown => return,
                        PumpExit::StreamEnded => {
                            tracing::warn!(topic = %self.topic, "Realtime stream ended, reconnecting");
                            if Self::wait(self.config.reconnect_delay, &mut shutdown).await {
                                return;
                            }
                        }
                    }
                }
                Err(e) => {
                    failures = failures.saturating_add(1);

                    if failures >= self.config.max_open_attempts {
                        if failures == self.config.max_open_attempts {
                            tracing::warn!(
                                topic = %self.topic,
                                error = %e,
                                attempts = failures,
                                "Realtime channel unavailable, falling back to polling"
                            );
                        } else {
                            tracing::debug!(topic = %self.topic, error = %e, "Channel reopen failed while polling");
                        }

                        if Self::wait(self.config.poll_interval, &mut shutdown).await {
                            return;
                        }
                        self.listeners.fan_out(&Signal::Poll);
                    } else {
                        let delay = self.config.jittered_delay(failures);
                        tracing::warn!(
                            topic = %self.topic,
                            error = %e,
                            attempt = failures,
                            delay_ms = delay.as_millis() as u64,
                            "Failed to open realtime channel, retrying"
                        );
                        if Self::wait(delay, &mut shutdown).await {
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Deliver events until shutdown or end of stream
    async fn pump(
        &self,
        mut events: mpsc::Receiver<ChangeEvent>,
        shutdown: &mut oneshot::Receiver<()>,
    ) -> PumpExit {
        loop {
            tokio::select! {
                _ = &mut *shutdown => return PumpExit::Shutdown,
                event = events.recv() => match event {
                    Some(event) if event.resource_id == self.resource_id => {
                        tracing::trace!(
                            topic = %self.topic,
                            class = %event.class,
                            "Realtime change received"
                        );
                        self.listeners.fan_out(&Signal::Remote(event));
                    }
                    Some(event) => {
                        tracing::trace!(
                            topic = %self.topic,
                            other = %event.resource_id,
                            "Ignoring change for another resource"
                        );
                    }
                    None => return PumpExit::StreamEnded,
                },
            }
        }
    }

    /// Sleep for `delay`; returns true if shutdown fired first
    async fn wait(delay: Duration, shutdown: &mut oneshot::Receiver<()>) -> bool {
        tokio::select! {
            _ = &mut *shutdown => true,
            () = tokio::time::sleep(delay) => false,
        }
    }
}
