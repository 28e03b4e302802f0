//! Per-resource coordination state.
//!
//! The intent version, the pending action count, refresh coalescing flags
//! and the write lane for one resource. Decisions that must be atomic with the
//! cache update they guard run inside the intent lock; those sections never
//! await.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Debug, Default)]
struct RefreshState {
    in_flight: bool,
    follow_up: bool,
}

#[derive(Debug, Default)]
pub(crate) struct ResourceSlot {
    intent: Mutex<u64>,
    pending_writes: AtomicUsize,
    refresh: Mutex<RefreshState>,
    /// A signal-driven refresh is spawned but has not started yet
    refresh_queued: AtomicBool,
    /// Serializes network writes so they reach the server in intent order
    pub(crate) write_lane: tokio::sync::Mutex<()>,
}

impl ResourceSlot {
    pub(crate) fn intent_version(&self) -> u64 {
        *self.intent.lock()
    }

    pub(crate) fn pending_writes(&self) -> usize {
        self.pending_writes.load(Ordering::SeqCst)
    }

    /// Start a new intent if `apply` accepts it
    ///
    /// `apply` receives the version the intent would get and performs the
    /// optimistic update; returning `None` aborts without bumping. An accepted
    /// intent counts as pending until the returned ticket is dropped, which
    /// happens once its write has been reconciled or rolled back.
    pub(crate) fn begin_intent<T>(
        &self,
        apply: impl FnOnce(u64) -> Option<T>,
    ) -> Option<(WriteTicket<'_>, u64, T)> {
        let mut intent = self.intent.lock();
        let next = *intent + 1;
        let value = apply(next)?;

        *intent = next;
        self.pending_writes.fetch_add(1, Ordering::SeqCst);
        Some((WriteTicket { slot: self }, next, value))
    }

    /// Run `apply` only while `version` is still the latest intent
    pub(crate) fn if_current(&self, version: u64, apply: impl FnOnce()) -> bool {
        let intent = self.intent.lock();
        if *intent != version {
            return false;
        }
        apply();
        true
    }

    /// Run `apply` only if no intent started since `version` and no write is pending
    pub(crate) fn if_quiet(&self, version: u64, apply: impl FnOnce()) -> bool {
        let intent = self.intent.lock();
        if *intent != version || self.pending_writes() > 0 {
            return false;
        }
        apply();
        true
    }

    /// Mark a signal-driven refresh as queued; false if one already is
    pub(crate) fn queue_refresh(&self) -> bool {
        !self.refresh_queued.swap(true, Ordering::SeqCst)
    }

    /// Called by the queued refresh as it starts, so later signals queue anew
    pub(crate) fn take_queued_refresh(&self) {
        self.refresh_queued.store(false, Ordering::SeqCst);
    }

    /// Claim the refresh slot; `None` means a fetch is already running
    ///
    /// A forced request that loses the race schedules one follow-up fetch
    /// for the current claim holder.
    pub(crate) fn try_start_refresh(&self, forced: bool) -> Option<RefreshClaim<'_>> {
        let mut state = self.refresh.lock();
        if state.in_flight {
            if forced {
                state.follow_up = true;
            }
            return None;
        }
        state.in_flight = true;
        Some(RefreshClaim {
            slot: self,
            released: false,
        })
    }
}

/// Exclusive right to fetch for one resource
///
/// Dropping the claim mid-fetch frees the slot for the next request.
pub(crate) struct RefreshClaim<'a> {
    slot: &'a ResourceSlot,
    released: bool,
}

impl RefreshClaim<'_> {
    /// Consume a scheduled follow-up, or release the slot if there is none
    pub(crate) fn take_follow_up(&mut self) -> bool {
        let mut state = self.slot.refresh.lock();
        if state.follow_up {
            state.follow_up = false;
            return true;
        }
        state.in_flight = false;
        self.released = true;
        false
    }
}

impl Drop for RefreshClaim<'_> {
    fn drop(&mut self) {
        if !self.released {
            let mut state = self.slot.refresh.lock();
            state.in_flight = false;
            state.follow_up = false;
        }
    }
}

/// Pending write marker; released on drop
#[must_use]
pub(crate) struct WriteTicket<'a> {
    slot: &'a ResourceSlot,
}

impl Drop for WriteTicket<'_> {
    fn drop(&mut self) {
        self.slot.pending_writes.fetch_sub(1, Ordering::SeqCst);
    }
}
