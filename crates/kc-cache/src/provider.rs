//! Remote cache tier traits.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::entity::{CacheEntity, SiteId};
use crate::error::CacheResult;
use crate::event::{CacheEntryListener, ListenerId};

/// A site's handle to the shared remote cache tier.
///
/// Implementations must be thread-safe and support concurrent access from
/// any number of workers.
///
/// ## Consistency
///
/// Data operations are strongly consistent across sites: once `remove`
/// returns, a `get` through any site's handle to the same tier returns
/// `None`. Change events are the only asynchronous part of the contract.
#[async_trait]
pub trait RemoteCache<V>: Send + Sync
where
    V: CacheEntity,
{
    /// Name of the cache this handle addresses.
    fn name(&self) -> &str;

    /// Site this handle belongs to.
    fn site(&self) -> &SiteId;

    /// Stores a value, replacing any previous one.
    ///
    /// Emits `Created` if the key was absent and `Modified` otherwise.
    async fn put(&self, key: &str, value: V) -> CacheResult<()>;

    /// Gets a value.
    ///
    /// Returns `None` if the key doesn't exist.
    async fn get(&self, key: &str) -> CacheResult<Option<V>>;

    /// Deletes a value.
    ///
    /// Returns `Ok(())` even if the key doesn't exist. Emits `Removed` only
    /// when an entry was deleted.
    async fn remove(&self, key: &str) -> CacheResult<()>;

    /// Replaces a value only if the stored version equals `expected`.
    ///
    /// Returns `false` when the key is absent or carries another version.
    async fn replace_if_version(&self, key: &str, expected: Uuid, value: V) -> CacheResult<bool>;

    /// Registers a change listener.
    ///
    /// The listener receives events for mutations made through every site's
    /// handle, not only this one.
    async fn add_listener(&self, listener: Arc<dyn CacheEntryListener>) -> CacheResult<ListenerId>;

    /// Unregisters a listener, delivering its queued events first.
    async fn remove_listener(&self, id: ListenerId) -> CacheResult<()>;

    /// Closes the handle and every listener registered through it.
    ///
    /// Further data operations fail with `CacheError::Closed`. Closing twice
    /// is a no-op.
    async fn close(&self) -> CacheResult<()>;
}

/// Opens remote tier handles for a site.
#[async_trait]
pub trait RemoteConnector<V>: Send + Sync
where
    V: CacheEntity,
{
    /// Opens `site`'s handle to the named cache.
    async fn connect(&self, site: &SiteId, cache_name: &str)
        -> CacheResult<Arc<dyn RemoteCache<V>>>;
}
