//! In-process remote tier.
//!
//! [`InMemoryRemoteTier`] is a single shared store per cache name. Every site
//! talks to it through its own [`InMemoryRemoteCache`] handle, so the
//! strong cross-site guarantee holds trivially while change events still go
//! through the asynchronous dispatch path with a non-zero delay.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::dispatch::ListenerRegistry;
use crate::entity::{CacheEntity, SiteId};
use crate::error::{CacheError, CacheResult};
use crate::event::{CacheEntryEvent, CacheEntryListener, ListenerId};
use crate::provider::{RemoteCache, RemoteConnector};

/// Events are never handed to listeners faster than this.
pub const MIN_PROPAGATION_DELAY: Duration = Duration::from_millis(1);

/// Tuning for in-memory tiers.
#[derive(Debug, Clone, Copy)]
pub struct TierOptions {
    /// Delay between a mutation and its event reaching listeners.
    pub propagation_delay: Duration,
    /// How long closing a listener waits for its queue to drain.
    pub drain_timeout: Duration,
}

impl Default for TierOptions {
    fn default() -> Self {
        Self {
            propagation_delay: Duration::from_millis(5),
            drain_timeout: Duration::from_secs(2),
        }
    }
}

/// Shared store backing one cache name.
pub struct InMemoryRemoteTier<V> {
    name: String,
    entries: DashMap<String, V>,
    listeners: ListenerRegistry,
    unavailable: AtomicBool,
}

impl<V: CacheEntity> InMemoryRemoteTier<V> {
    /// Creates a tier with default options.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Self::with_options(name, TierOptions::default())
    }

    /// Creates a tier with explicit options.
    #[must_use]
    pub fn with_options(name: impl Into<String>, options: TierOptions) -> Arc<Self> {
        let name = name.into();
        let delay = options.propagation_delay.max(MIN_PROPAGATION_DELAY);
        Arc::new(Self {
            listeners: ListenerRegistry::new(name.clone(), delay, options.drain_timeout),
            name,
            entries: DashMap::new(),
            unavailable: AtomicBool::new(false),
        })
    }

    /// Opens a handle to this tier for `site`.
    #[must_use]
    pub fn handle(self: &Arc<Self>, site: impl Into<SiteId>) -> InMemoryRemoteCache<V> {
        InMemoryRemoteCache {
            tier: Arc::clone(self),
            site: site.into(),
            owned: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Cache name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the tier holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of listeners attached through any handle.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Simulates a transport outage: every data operation fails with
    /// `CacheError::Connection` while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Release);
    }

    fn check_available(&self) -> CacheResult<()> {
        if self.unavailable.load(Ordering::Acquire) {
            return Err(CacheError::Connection(format!(
                "remote tier '{}' unreachable",
                self.name
            )));
        }
        Ok(())
    }

    fn put(&self, key: &str, value: V) -> CacheResult<()> {
        self.check_available()?;
        let existed = self.entries.insert(key.to_string(), value).is_some();
        let event = if existed {
            CacheEntryEvent::modified(key)
        } else {
            CacheEntryEvent::created(key)
        };
        self.listeners.publish(&event);
        Ok(())
    }

    fn get(&self, key: &str) -> CacheResult<Option<V>> {
        self.check_available()?;
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    fn remove(&self, key: &str) -> CacheResult<()> {
        self.check_available()?;
        if self.entries.remove(key).is_some() {
            self.listeners.publish(&CacheEntryEvent::removed(key));
        }
        Ok(())
    }

    fn replace_if_version(&self, key: &str, expected: Uuid, value: V) -> CacheResult<bool> {
        self.check_available()?;
        let Some(mut entry) = self.entries.get_mut(key) else {
            return Ok(false);
        };
        if entry.version() != expected {
            return Ok(false);
        }
        *entry = value;
        drop(entry);

        self.listeners.publish(&CacheEntryEvent::modified(key));
        Ok(true)
    }
}

/// A site's handle to an [`InMemoryRemoteTier`].
pub struct InMemoryRemoteCache<V> {
    tier: Arc<InMemoryRemoteTier<V>>,
    site: SiteId,
    owned: Mutex<Vec<ListenerId>>,
    closed: AtomicBool,
}

impl<V: CacheEntity> InMemoryRemoteCache<V> {
    /// The shared tier behind this handle.
    #[must_use]
    pub const fn tier(&self) -> &Arc<InMemoryRemoteTier<V>> {
        &self.tier
    }

    fn ensure_open(&self) -> CacheResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CacheError::Closed(self.tier.name.clone()));
        }
        Ok(())
    }
}

#[async_trait]
impl<V: CacheEntity> RemoteCache<V> for InMemoryRemoteCache<V> {
    fn name(&self) -> &str {
        &self.tier.name
    }

    fn site(&self) -> &SiteId {
        &self.site
    }

    async fn put(&self, key: &str, value: V) -> CacheResult<()> {
        self.ensure_open()?;
        self.tier.put(key, value)
    }

    async fn get(&self, key: &str) -> CacheResult<Option<V>> {
        self.ensure_open()?;
        self.tier.get(key)
    }

    async fn remove(&self, key: &str) -> CacheResult<()> {
        self.ensure_open()?;
        self.tier.remove(key)
    }

    async fn replace_if_version(&self, key: &str, expected: Uuid, value: V) -> CacheResult<bool> {
        self.ensure_open()?;
        self.tier.replace_if_version(key, expected, value)
    }

    async fn add_listener(&self, listener: Arc<dyn CacheEntryListener>) -> CacheResult<ListenerId> {
        self.ensure_open()?;
        let id = self.tier.listeners.register(listener);
        self.owned.lock().push(id);
        Ok(id)
    }

    async fn remove_listener(&self, id: ListenerId) -> CacheResult<()> {
        self.owned.lock().retain(|owned| *owned != id);
        self.tier.listeners.unregister(id).await;
        Ok(())
    }

    async fn close(&self) -> CacheResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        let owned = std::mem::take(&mut *self.owned.lock());
        let mut dropped = 0;
        for id in owned {
            dropped += self.tier.listeners.unregister(id).await;
        }

        tracing::info!(
            cache = %self.tier.name,
            site = %self.site,
            dropped_events = dropped,
            "remote cache handle closed"
        );
        Ok(())
    }
}

/// Connector handing out handles to shared in-memory tiers.
///
/// Every connector clone shares the same tiers, so managers built for
/// different sites from one registry see the same data.
pub struct InMemoryTierRegistry<V> {
    options: TierOptions,
    tiers: DashMap<String, Arc<InMemoryRemoteTier<V>>>,
}

impl<V: CacheEntity> InMemoryTierRegistry<V> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(options: TierOptions) -> Self {
        Self {
            options,
            tiers: DashMap::new(),
        }
    }

    /// Returns the tier for `cache_name`, creating it on first use.
    #[must_use]
    pub fn tier(&self, cache_name: &str) -> Arc<InMemoryRemoteTier<V>> {
        let entry = self
            .tiers
            .entry(cache_name.to_string())
            .or_insert_with(|| InMemoryRemoteTier::with_options(cache_name, self.options));
        Arc::clone(entry.value())
    }
}

impl<V: CacheEntity> Default for InMemoryTierRegistry<V> {
    fn default() -> Self {
        Self::new(TierOptions::default())
    }
}

#[async_trait]
impl<V: CacheEntity> RemoteConnector<V> for InMemoryTierRegistry<V> {
    async fn connect(
        &self,
        site: &SiteId,
        cache_name: &str,
    ) -> CacheResult<Arc<dyn RemoteCache<V>>> {
        let handle = self.tier(cache_name).handle(site.clone());
        Ok(Arc::new(handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::CacheEntryEventKind;

    #[derive(Debug, Clone, PartialEq)]
    struct Entry {
        key: String,
        version: Uuid,
    }

    impl Entry {
        fn new(key: &str) -> Self {
            Self {
                key: key.to_string(),
                version: Uuid::new_v4(),
            }
        }
    }

    impl CacheEntity for Entry {
        fn cache_key(&self) -> &str {
            &self.key
        }

        fn version(&self) -> Uuid {
            self.version
        }
    }

    #[derive(Default)]
    struct Collect {
        events: Mutex<Vec<CacheEntryEvent>>,
    }

    impl CacheEntryListener for Collect {
        fn on_event(&self, event: &CacheEntryEvent) {
            self.events.lock().push(event.clone());
        }
    }

    fn fast() -> TierOptions {
        TierOptions {
            propagation_delay: Duration::from_millis(2),
            drain_timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn remove_is_immediately_visible_from_other_site() {
        let tier = InMemoryRemoteTier::<Entry>::with_options("sessions", fast());
        let dc1 = tier.handle("dc1");
        let dc2 = tier.handle("dc2");

        dc1.put("1", Entry::new("1")).await.unwrap();
        assert!(dc2.get("1").await.unwrap().is_some());

        dc1.remove("1").await.unwrap();
        assert!(dc2.get("1").await.unwrap().is_none());
        assert!(dc1.get("1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn mutations_emit_typed_events_to_all_sites() {
        let tier = InMemoryRemoteTier::<Entry>::with_options("sessions", fast());
        let dc1 = tier.handle("dc1");
        let dc2 = tier.handle("dc2");
        let listener = Arc::new(Collect::default());
        dc2.add_listener(listener.clone()).await.unwrap();

        dc1.put("1", Entry::new("1")).await.unwrap();
        dc1.put("1", Entry::new("1")).await.unwrap();
        dc1.remove("1").await.unwrap();
        dc1.remove("1").await.unwrap();

        dc2.close().await.unwrap();
        let kinds: Vec<_> = listener.events.lock().iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                CacheEntryEventKind::Created,
                CacheEntryEventKind::Modified,
                CacheEntryEventKind::Removed,
            ]
        );
    }

    #[tokio::test]
    async fn replace_requires_matching_version() {
        let tier = InMemoryRemoteTier::<Entry>::with_options("sessions", fast());
        let dc1 = tier.handle("dc1");
        let original = Entry::new("1");
        dc1.put("1", original.clone()).await.unwrap();

        let stale = dc1
            .replace_if_version("1", Uuid::new_v4(), Entry::new("1"))
            .await
            .unwrap();
        assert!(!stale);
        assert_eq!(dc1.get("1").await.unwrap(), Some(original.clone()));

        let next = Entry::new("1");
        let replaced = dc1
            .replace_if_version("1", original.version, next.clone())
            .await
            .unwrap();
        assert!(replaced);
        assert_eq!(dc1.get("1").await.unwrap(), Some(next));

        let missing = dc1
            .replace_if_version("2", original.version, Entry::new("2"))
            .await
            .unwrap();
        assert!(!missing);
    }

    #[tokio::test]
    async fn outage_surfaces_as_connection_error() {
        let tier = InMemoryRemoteTier::<Entry>::with_options("sessions", fast());
        let dc1 = tier.handle("dc1");
        tier.set_unavailable(true);

        let err = dc1.get("1").await.unwrap_err();
        assert!(err.is_transport());

        tier.set_unavailable(false);
        assert!(dc1.get("1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn closed_handle_rejects_operations() {
        let tier = InMemoryRemoteTier::<Entry>::with_options("sessions", fast());
        let dc1 = tier.handle("dc1");
        dc1.add_listener(Arc::new(Collect::default())).await.unwrap();
        assert_eq!(tier.listener_count(), 1);

        dc1.close().await.unwrap();
        dc1.close().await.unwrap();
        assert_eq!(tier.listener_count(), 0);
        assert_eq!(
            dc1.get("1").await.unwrap_err(),
            CacheError::Closed("sessions".into())
        );
    }

    #[tokio::test]
    async fn registry_shares_tiers_between_sites() {
        let registry = InMemoryTierRegistry::<Entry>::new(fast());
        let dc1 = registry.connect(&SiteId::new("dc1"), "sessions").await.unwrap();
        let dc2 = registry.connect(&SiteId::new("dc2"), "sessions").await.unwrap();
        let other = registry.connect(&SiteId::new("dc2"), "offline").await.unwrap();

        dc1.put("1", Entry::new("1")).await.unwrap();
        assert!(dc2.get("1").await.unwrap().is_some());
        assert!(other.get("1").await.unwrap().is_none());
        assert_eq!(dc2.site().as_str(), "dc2");
    }
}
