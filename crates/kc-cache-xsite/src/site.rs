//! Per-site wiring of a local cache to its remote handle.

use std::sync::Arc;

use kc_cache::{CacheEntity, CacheResult, ListenerId, RemoteCache, SiteId};

use crate::listener::{InvalidationPropagator, ListenerStats};
use crate::local::LocalCache;

/// One site's view of one named cache.
///
/// Owns the local cache, the invalidation listener registered on the
/// site's remote handle, and that listener's counters.
pub struct SiteCoordinator<V: CacheEntity> {
    local: Arc<LocalCache<V>>,
    stats: Arc<ListenerStats>,
    listener: ListenerId,
}

impl<V: CacheEntity> SiteCoordinator<V> {
    /// Registers an [`InvalidationPropagator`] for `local` on its remote
    /// handle.
    ///
    /// ## Errors
    ///
    /// Returns the tier error if the listener cannot be registered.
    pub async fn attach(local: Arc<LocalCache<V>>) -> CacheResult<Self> {
        let stats = Arc::new(ListenerStats::default());
        let propagator = InvalidationPropagator::new(&local, Arc::clone(&stats));
        let listener = local.remote().add_listener(Arc::new(propagator)).await?;

        tracing::info!(
            site = %local.site(),
            cache = %local.name(),
            listener = %listener,
            "invalidation listener registered"
        );
        Ok(Self {
            local,
            stats,
            listener,
        })
    }

    /// Site id.
    #[must_use]
    pub fn site(&self) -> &SiteId {
        self.local.site()
    }

    /// The site's local cache.
    #[must_use]
    pub const fn local(&self) -> &Arc<LocalCache<V>> {
        &self.local
    }

    /// The site's remote handle.
    #[must_use]
    pub fn remote(&self) -> &Arc<dyn RemoteCache<V>> {
        self.local.remote()
    }

    /// Counters of the site's listener.
    #[must_use]
    pub const fn stats(&self) -> &Arc<ListenerStats> {
        &self.stats
    }

    /// Id of the registered listener.
    #[must_use]
    pub const fn listener_id(&self) -> ListenerId {
        self.listener
    }

    /// Removes the listener, closes the remote handle and clears the local
    /// cache.
    ///
    /// ## Errors
    ///
    /// Returns the first tier error; the local cache is cleared regardless.
    pub async fn shutdown(&self) -> CacheResult<()> {
        let detached = self.remote().remove_listener(self.listener).await;
        let closed = self.remote().close().await;
        self.local.clear_local();

        tracing::info!(
            site = %self.site(),
            cache = %self.local.name(),
            events = self.stats.events(),
            "site cache shut down"
        );
        detached.and(closed)
    }
}
