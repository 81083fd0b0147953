//! Per-site cache manager.
//!
//! A manager hands out the local caches of one site, creating each named
//! cache once and wiring its invalidation listener on first use.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use kc_cache::{CacheEntity, RemoteConnector, SiteId};
use tokio::sync::Mutex;

use crate::error::{XSiteError, XSiteResult};
use crate::local::LocalCache;
use crate::site::SiteCoordinator;

/// Cache manager of one site.
pub struct CacheManager<V: CacheEntity> {
    site: SiteId,
    connector: Arc<dyn RemoteConnector<V>>,
    caches: Mutex<HashMap<String, Arc<SiteCoordinator<V>>>>,
    stopped: AtomicBool,
}

impl<V: CacheEntity> CacheManager<V> {
    /// Creates a manager for `site` reaching the tier through `connector`.
    #[must_use]
    pub fn create(site: impl Into<SiteId>, connector: Arc<dyn RemoteConnector<V>>) -> Self {
        let site = site.into();
        tracing::info!(site = %site, "cache manager created");
        Self {
            site,
            connector,
            caches: Mutex::new(HashMap::new()),
            stopped: AtomicBool::new(false),
        }
    }

    /// Site served by this manager.
    #[must_use]
    pub const fn site(&self) -> &SiteId {
        &self.site
    }

    /// Returns whether [`stop`](Self::stop) has been called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Returns the local cache for `name`, creating it on first use.
    ///
    /// ## Errors
    ///
    /// Returns [`XSiteError::Stopped`] after [`stop`](Self::stop), or the
    /// tier error if connecting fails.
    pub async fn get_cache(&self, name: &str) -> XSiteResult<Arc<LocalCache<V>>> {
        Ok(Arc::clone(self.coordinator(name).await?.local()))
    }

    /// Returns the site coordinator for `name`, creating it on first use.
    ///
    /// ## Errors
    ///
    /// Same as [`get_cache`](Self::get_cache).
    pub async fn coordinator(&self, name: &str) -> XSiteResult<Arc<SiteCoordinator<V>>> {
        let mut caches = self.caches.lock().await;
        if self.is_stopped() {
            return Err(XSiteError::Stopped(self.site.clone()));
        }
        if let Some(existing) = caches.get(name) {
            return Ok(Arc::clone(existing));
        }

        let remote = self.connector.connect(&self.site, name).await?;
        let local = Arc::new(LocalCache::new(remote));
        let coordinator = Arc::new(SiteCoordinator::attach(local).await?);
        caches.insert(name.to_string(), Arc::clone(&coordinator));

        tracing::info!(site = %self.site, cache = name, "cache started");
        Ok(coordinator)
    }

    /// Names of the caches created so far.
    pub async fn cache_names(&self) -> Vec<String> {
        self.caches.lock().await.keys().cloned().collect()
    }

    /// Shuts down every cache of this site.
    ///
    /// Listeners are removed first, draining their queued events, then the
    /// remote handles are closed and the local caches cleared. Calling this
    /// again does nothing.
    ///
    /// ## Errors
    ///
    /// Returns the first tier error. Remaining caches are still shut down.
    pub async fn stop(&self) -> XSiteResult<()> {
        let mut caches = self.caches.lock().await;
        if self.stopped.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let mut first_error = None;
        for (name, coordinator) in caches.drain() {
            if let Err(err) = coordinator.shutdown().await {
                tracing::warn!(site = %self.site, cache = %name, error = %err, "cache shutdown failed");
                first_error.get_or_insert(err);
            }
        }
        tracing::info!(site = %self.site, "cache manager stopped");

        first_error.map_or(Ok(()), |err| Err(err.into()))
    }
}
