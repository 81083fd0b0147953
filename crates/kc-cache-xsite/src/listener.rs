//! Invalidation listener keeping a site's local cache in step with the tier.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use kc_cache::{CacheEntity, CacheEntryListener, SiteId};
use serde::Serialize;

use crate::local::LocalCache;

/// Event counters for one site's listener.
#[derive(Debug, Default)]
pub struct ListenerStats {
    created: AtomicU64,
    modified: AtomicU64,
    removed: AtomicU64,
    local_evictions: AtomicU64,
    local_removals: AtomicU64,
}

/// Point-in-time copy of [`ListenerStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ListenerStatsSnapshot {
    /// Created events seen.
    pub created: u64,
    /// Modified events seen.
    pub modified: u64,
    /// Removed events seen.
    pub removed: u64,
    /// Local copies evicted because of Modified events.
    pub local_evictions: u64,
    /// Local copies deleted because of Removed events.
    pub local_removals: u64,
}

impl ListenerStats {
    /// Reads all counters.
    #[must_use]
    pub fn snapshot(&self) -> ListenerStatsSnapshot {
        ListenerStatsSnapshot {
            created: self.created.load(Ordering::Relaxed),
            modified: self.modified.load(Ordering::Relaxed),
            removed: self.removed.load(Ordering::Relaxed),
            local_evictions: self.local_evictions.load(Ordering::Relaxed),
            local_removals: self.local_removals.load(Ordering::Relaxed),
        }
    }

    /// Total events seen.
    #[must_use]
    pub fn events(&self) -> u64 {
        let snapshot = self.snapshot();
        snapshot.created + snapshot.modified + snapshot.removed
    }
}

/// Applies tier change events to the local cache of the same site.
///
/// Every action is local and idempotent, so duplicated or reordered
/// deliveries leave the cache in the same state. Counters are bumped after
/// the local action has run. The tier's dispatch task owns this listener,
/// so it holds the cache weakly; events arriving after the cache is gone
/// are counted and otherwise ignored.
pub struct InvalidationPropagator<V: CacheEntity> {
    site: SiteId,
    local: Weak<LocalCache<V>>,
    stats: Arc<ListenerStats>,
}

impl<V: CacheEntity> InvalidationPropagator<V> {
    /// Creates a listener for `local`, counting into `stats`.
    #[must_use]
    pub fn new(local: &Arc<LocalCache<V>>, stats: Arc<ListenerStats>) -> Self {
        Self {
            site: local.site().clone(),
            local: Arc::downgrade(local),
            stats,
        }
    }

    fn delete_local(&self, key: &str) -> bool {
        match self.local.upgrade() {
            Some(local) => local.local_delete_no_propagate(key),
            None => {
                tracing::debug!(site = %self.site, key, "local cache dropped, event ignored");
                false
            }
        }
    }
}

impl<V: CacheEntity> CacheEntryListener for InvalidationPropagator<V> {
    fn on_created(&self, key: &str) {
        self.stats.created.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(site = %self.site, key, "session created");
    }

    fn on_modified(&self, key: &str) {
        if self.delete_local(key) {
            self.stats.local_evictions.fetch_add(1, Ordering::Relaxed);
        }
        self.stats.modified.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(site = %self.site, key, "session modified");
    }

    fn on_removed(&self, key: &str) {
        if self.delete_local(key) {
            self.stats.local_removals.fetch_add(1, Ordering::Relaxed);
        }
        self.stats.removed.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(site = %self.site, key, "session removed");
    }
}
