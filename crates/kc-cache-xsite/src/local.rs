//! Site-local near-cache in front of the remote tier.
//!
//! Writes go through to the tier first. Reads are served locally when
//! possible and loaded from the tier otherwise. Removals made by other sites
//! reach this cache only through [`LocalCache::local_delete_no_propagate`],
//! called by the site's invalidation listener.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use kc_cache::{CacheEntity, CacheResult, RemoteCache, SiteId};
use uuid::Uuid;

/// Near-cache for one named cache on one site.
pub struct LocalCache<V: CacheEntity> {
    site: SiteId,
    entries: DashMap<String, V>,
    remote: Arc<dyn RemoteCache<V>>,
    /// Bumped on every local delete; lets a write-through or read-through
    /// detect that an invalidation ran while it was waiting on the tier.
    invalidations: AtomicU64,
}

impl<V: CacheEntity> LocalCache<V> {
    /// Creates an empty local cache bound to the site's remote handle.
    #[must_use]
    pub fn new(remote: Arc<dyn RemoteCache<V>>) -> Self {
        Self {
            site: remote.site().clone(),
            entries: DashMap::new(),
            remote,
            invalidations: AtomicU64::new(0),
        }
    }

    /// Cache name shared with the remote tier.
    #[must_use]
    pub fn name(&self) -> &str {
        self.remote.name()
    }

    /// Site owning this cache.
    #[must_use]
    pub const fn site(&self) -> &SiteId {
        &self.site
    }

    /// The site's handle to the remote tier.
    #[must_use]
    pub const fn remote(&self) -> &Arc<dyn RemoteCache<V>> {
        &self.remote
    }

    /// Writes through to the tier, then stores the value locally.
    ///
    /// ## Errors
    ///
    /// Returns the tier error; the local cache is left unchanged.
    pub async fn put(&self, key: &str, value: V) -> CacheResult<()> {
        let generation = self.generation();
        self.remote.put(key, value.clone()).await?;
        self.store_unless_invalidated(key, value, generation);
        Ok(())
    }

    /// Returns the local copy, loading it from the tier on a miss.
    ///
    /// ## Errors
    ///
    /// Returns the tier error if the load fails.
    pub async fn get(&self, key: &str) -> CacheResult<Option<V>> {
        if let Some(value) = self.peek(key) {
            return Ok(Some(value));
        }

        let generation = self.generation();
        let loaded = self.remote.get(key).await?;
        if let Some(value) = &loaded {
            self.store_unless_invalidated(key, value.clone(), generation);
        }
        Ok(loaded)
    }

    /// Reads the local copy only.
    #[must_use]
    pub fn peek(&self, key: &str) -> Option<V> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Returns whether a local copy exists.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Removes the key from the tier, then locally.
    ///
    /// Removing an absent key succeeds.
    ///
    /// ## Errors
    ///
    /// Returns the tier error; the local copy is kept in that case.
    pub async fn remove(&self, key: &str) -> CacheResult<()> {
        self.remote.remove(key).await?;
        self.local_delete_no_propagate(key);
        Ok(())
    }

    /// Replaces the tier value if its version still matches `expected`.
    ///
    /// On success the local copy is updated. On a version conflict the local
    /// copy is evicted so the next [`get`](Self::get) reloads the winner.
    ///
    /// ## Errors
    ///
    /// Returns the tier error.
    pub async fn replace(&self, key: &str, expected: Uuid, value: V) -> CacheResult<bool> {
        let generation = self.generation();
        let replaced = self
            .remote
            .replace_if_version(key, expected, value.clone())
            .await?;
        if replaced {
            self.store_unless_invalidated(key, value, generation);
        } else {
            self.local_delete_no_propagate(key);
        }
        Ok(replaced)
    }

    fn generation(&self) -> u64 {
        self.invalidations.load(Ordering::SeqCst)
    }

    /// Stores a copy obtained from the tier after `generation` was read.
    ///
    /// If any invalidation ran in between, its event may have arrived before
    /// the copy existed locally, so the copy is dropped again.
    fn store_unless_invalidated(&self, key: &str, value: V, generation: u64) {
        self.entries.insert(key.to_string(), value);
        if self.generation() != generation {
            tracing::debug!(site = %self.site, key, "local copy dropped after concurrent invalidation");
            self.entries.remove(key);
        }
    }

    /// Deletes the local copy without touching the tier.
    ///
    /// Returns `false` when there was nothing to delete.
    pub fn local_delete_no_propagate(&self, key: &str) -> bool {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
        self.entries.remove(key).is_some()
    }

    /// Drops every local copy without touching the tier.
    pub fn clear_local(&self) {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
        self.entries.clear();
    }

    /// Number of local copies.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the local cache holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keys with a local copy, in no particular order.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.entries.iter().map(|entry| entry.key().clone()).collect()
    }
}

impl<V: CacheEntity> std::fmt::Debug for LocalCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCache")
            .field("site", &self.site)
            .field("name", &self.remote.name())
            .field("entries", &self.entries.len())
            .finish_non_exhaustive()
    }
}

/// Returns the remote handle behind a local cache.
#[must_use]
pub fn remote_cache_for<V: CacheEntity>(local: &LocalCache<V>) -> Arc<dyn RemoteCache<V>> {
    Arc::clone(local.remote())
}
