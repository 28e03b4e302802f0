//! In-memory reaction snapshot cache.
//!
//! Holds the last fetched aggregate state per resource. Entries are served
//! without a network round-trip only inside the freshness window; older
//! entries are still kept so a widget can render last-known data while a
//! refetch runs. Resources pinned by a mounted widget are never evicted.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use echo_common::CacheConfig;
use echo_core::{ReactionCount, ReactionSnapshot, ResourceId, UserReaction};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Default freshness window (5 seconds)
pub const DEFAULT_FRESHNESS_WINDOW: Duration = Duration::from_secs(5);

/// Cache tuning knobs
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// How long an entry is served without refetching
    pub freshness_window: Duration,
    /// Maximum number of resources kept
    pub max_entries: usize,
    /// Entries older than this are removed by [`ReactionCache::sweep`]
    pub max_age: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self::from(&CacheConfig::default())
    }
}

impl From<&CacheConfig> for CacheSettings {
    fn from(config: &CacheConfig) -> Self {
        Self {
            freshness_window: config.freshness_window(),
            max_entries: config.max_entries,
            max_age: config.max_age(),
        }
    }
}

/// A cached snapshot and when it was stamped
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub snapshot: ReactionSnapshot,
    pub fetched_at: Instant,
    /// Last `put`, `get` hit or `peek`; drives capacity eviction
    pub last_used: Instant,
    /// Set by [`ReactionCache::invalidate`]; a stale entry is never fresh
    pub stale: bool,
}

impl CacheEntry {
    /// Whether the entry may be used without refetching at `now`
    pub fn is_fresh_at(&self, window: Duration, now: Instant) -> bool {
        !self.stale && now.saturating_duration_since(self.fetched_at) < window
    }

    pub fn counts(&self) -> &[ReactionCount] {
        &self.snapshot.counts
    }

    pub fn user_reaction(&self) -> Option<&UserReaction> {
        self.snapshot.user_reaction.as_ref()
    }
}

/// Process-wide snapshot cache keyed by resource
#[derive(Debug)]
pub struct ReactionCache {
    entries: DashMap<ResourceId, CacheEntry>,
    pins: DashMap<ResourceId, usize>,
    settings: CacheSettings,
}

impl ReactionCache {
    /// Create a cache with the given settings
    #[must_use]
    pub fn new(settings: CacheSettings) -> Self {
        Self {
            entries: DashMap::new(),
            pins: DashMap::new(),
            settings,
        }
    }

    /// Create a new cache wrapped in Arc
    #[must_use]
    pub fn new_shared(settings: CacheSettings) -> Arc<Self> {
        Arc::new(Self::new(settings))
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// Fresh entry for a resource, or `None` when absent or expired
    pub fn get(&self, resource_id: &ResourceId) -> Option<CacheEntry> {
        let now = Instant::now();
        let mut entry = self.entries.get_mut(resource_id)?;
        if !entry.is_fresh_at(self.settings.freshness_window, now) {
            return None;
        }
        entry.last_used = now;
        Some(entry.clone())
    }

    /// Entry for a resource regardless of freshness
    pub fn peek(&self, resource_id: &ResourceId) -> Option<CacheEntry> {
        let mut entry = self.entries.get_mut(resource_id)?;
        entry.last_used = Instant::now();
        Some(entry.clone())
    }

    /// Overwrite the entry for a resource and stamp it now
    pub fn put(
        &self,
        resource_id: &ResourceId,
        counts: Vec<ReactionCount>,
        user_reaction: Option<UserReaction>,
    ) -> CacheEntry {
        self.put_snapshot(ReactionSnapshot::new(resource_id.clone(), counts, user_reaction))
    }

    /// Overwrite the entry with a prepared snapshot
    pub fn put_snapshot(&self, snapshot: ReactionSnapshot) -> CacheEntry {
        let resource_id = snapshot.resource_id.clone();
        let now = Instant::now();
        let entry = CacheEntry {
            snapshot,
            fetched_at: now,
            last_used: now,
            stale: false,
        };
        self.entries.insert(resource_id.clone(), entry.clone());

        tracing::trace!(resource_id = %resource_id, "Cache entry stored");

        self.evict_over_capacity(&resource_id);
        entry
    }

    /// Force the next `get` to miss while keeping the data for `peek`
    pub fn invalidate(&self, resource_id: &ResourceId) -> bool {
        match self.entries.get_mut(resource_id) {
            Some(mut entry) => {
                entry.stale = true;
                true
            }
            None => false,
        }
    }

    /// Keep a resource's entry out of capacity eviction and sweeps
    ///
    /// Pins are counted; the resource is released when the last guard drops.
    pub fn pin(self: &Arc<Self>, resource_id: &ResourceId) -> CachePin {
        *self.pins.entry(resource_id.clone()).or_insert(0) += 1;
        CachePin {
            cache: Arc::downgrade(self),
            resource_id: resource_id.clone(),
        }
    }

    pub fn is_pinned(&self, resource_id: &ResourceId) -> bool {
        self.pins.contains_key(resource_id)
    }

    /// Remove unpinned entries older than the configured max age
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let max_age = self.settings.max_age;
        let before = self.entries.len();

        self.entries.retain(|resource_id, entry| {
            now.saturating_duration_since(entry.fetched_at) < max_age || self.is_pinned(resource_id)
        });

        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            tracing::debug!(removed = removed, "Swept expired cache entries");
        }
        removed
    }

    /// Run [`sweep`](Self::sweep) every `interval` until the cache is dropped
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match cache.upgrade() {
                    Some(cache) => {
                        cache.sweep();
                    }
                    None => break,
                }
            }
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, resource_id: &ResourceId) -> bool {
        self.entries.contains_key(resource_id)
    }

    /// Drop least recently used entries until within capacity
    ///
    /// Pinned entries are skipped, so the cache may stay above `max_entries`
    /// while more resources than that are on screen.
    fn evict_over_capacity(&self, keep: &ResourceId) {
        while self.entries.len() > self.settings.max_entries {
            let oldest = self
                .entries
                .iter()
                .filter(|entry| entry.key() != keep && !self.is_pinned(entry.key()))
                .min_by_key(|entry| entry.last_used)
                .map(|entry| entry.key().clone());

            match oldest {
                Some(resource_id) => {
                    self.entries.remove(&resource_id);
                    tracing::trace!(resource_id = %resource_id, "Evicted cache entry");
                }
                None => break,
            }
        }
    }

    fn unpin(&self, resource_id: &ResourceId) {
        if let Entry::Occupied(mut pins) = self.pins.entry(resource_id.clone()) {
            *pins.get_mut() -= 1;
            if *pins.get() == 0 {
                pins.remove();
            }
        }
    }
}

/// Guard returned by [`ReactionCache::pin`]
#[must_use = "dropping a CachePin unpins immediately"]
#[derive(Debug)]
pub struct CachePin {
    cache: Weak<ReactionCache>,
    resource_id: ResourceId,
}

impl CachePin {
    pub fn resource_id(&self) -> &ResourceId {
        &self.resource_id
    }
}

impl Drop for CachePin {
    fn drop(&mut self) {
        if let Some(cache) = self.cache.upgrade() {
            cache.unpin(&self.resource_id);
        }
    }
}

impl Default for ReactionCache {
    fn default() -> Self {
        Self::new(CacheSettings::default())
    }
}
