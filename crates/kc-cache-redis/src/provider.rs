//! Redis remote tier implementation.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fred::clients::SubscriberClient;
use fred::prelude::*;
use fred::types::config::{ConnectionConfig, PerformanceConfig};
use fred::types::Message;
use kc_cache::{
    CacheEntity, CacheEntryEvent, CacheEntryListener, CacheError, CacheResult, ListenerId,
    ListenerRegistry, RemoteCache, RemoteConnector, SiteId,
};
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::{AbortHandle, JoinHandle};
use uuid::Uuid;

use crate::config::RedisConfig;
use crate::error::{from_redis_error, from_serde_error};
use crate::scripts;

/// A site's handle to a cache stored in Redis.
///
/// Every site opens its own connection; the Redis server is the shared
/// tier. Change events travel over pub/sub and are received by a
/// subscriber connection opened on the first `add_listener`.
pub struct RedisRemoteCache<V> {
    client: Client,
    config: RedisConfig,
    name: String,
    site: SiteId,
    channel: String,
    listeners: Arc<ListenerRegistry>,
    subscription: tokio::sync::Mutex<Option<Subscription>>,
    owned: parking_lot::Mutex<Vec<ListenerId>>,
    closed: AtomicBool,
    _value: PhantomData<fn() -> V>,
}

struct Subscription {
    client: SubscriberClient,
    forward: JoinHandle<()>,
    resubscribe: AbortHandle,
}

impl<V> RedisRemoteCache<V>
where
    V: CacheEntity + Serialize + DeserializeOwned,
{
    /// Connects `site` to the named cache.
    ///
    /// ## Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub async fn connect(
        config: RedisConfig,
        site: SiteId,
        cache_name: impl Into<String>,
    ) -> CacheResult<Self> {
        let name = cache_name.into();
        let client = Client::new(
            redis_config(&config)?,
            Some(performance_config(&config)),
            Some(connection_config(&config)),
            Some(reconnect_policy()),
        );
        client.init().await.map_err(from_redis_error)?;

        tracing::info!(cache = %name, site = %site, url = %redacted_url(&config), "connected to redis tier");

        Ok(Self {
            client,
            channel: config.event_channel(&name),
            // Redis pub/sub already delivers behind the write path.
            listeners: Arc::new(ListenerRegistry::new(
                name.clone(),
                Duration::ZERO,
                config.drain_timeout(),
            )),
            config,
            name,
            site,
            subscription: tokio::sync::Mutex::new(None),
            owned: parking_lot::Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            _value: PhantomData,
        })
    }

    /// Returns the underlying Redis client.
    #[must_use]
    pub const fn client(&self) -> &Client {
        &self.client
    }

    fn key(&self, key: &str) -> String {
        self.config.entry_key(&self.name, key)
    }

    fn ensure_open(&self) -> CacheResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(CacheError::Closed(self.name.clone()));
        }
        Ok(())
    }

    async fn ensure_subscribed(&self) -> CacheResult<()> {
        let mut subscription = self.subscription.lock().await;
        if subscription.is_some() {
            return Ok(());
        }

        let subscriber = SubscriberClient::new(
            redis_config(&self.config)?,
            Some(performance_config(&self.config)),
            Some(connection_config(&self.config)),
            Some(reconnect_policy()),
        );
        subscriber.init().await.map_err(from_redis_error)?;

        let rx = subscriber.message_rx();
        subscriber
            .subscribe(self.channel.clone())
            .await
            .map_err(from_redis_error)?;
        let resubscribe = subscriber.manage_subscriptions().abort_handle();

        let forward = tokio::spawn(forward_events(
            rx,
            self.channel.clone(),
            Arc::clone(&self.listeners),
        ));

        tracing::debug!(cache = %self.name, site = %self.site, channel = %self.channel, "subscribed to change events");

        *subscription = Some(Subscription {
            client: subscriber,
            forward,
            resubscribe,
        });
        Ok(())
    }

    async fn stop_subscription(&self) {
        let Some(subscription) = self.subscription.lock().await.take() else {
            return;
        };
        let Subscription {
            client,
            mut forward,
            resubscribe,
        } = subscription;

        resubscribe.abort();
        if let Err(err) = client.unsubscribe(self.channel.clone()).await {
            tracing::warn!(cache = %self.name, error = %err, "unsubscribe failed");
        }
        if let Err(err) = client.quit().await {
            tracing::warn!(cache = %self.name, error = %err, "subscriber quit failed");
        }
        drop(client);

        if tokio::time::timeout(self.config.drain_timeout(), &mut forward)
            .await
            .is_err()
        {
            forward.abort();
        }
    }
}

#[async_trait]
impl<V> RemoteCache<V> for RedisRemoteCache<V>
where
    V: CacheEntity + Serialize + DeserializeOwned,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn site(&self) -> &SiteId {
        &self.site
    }

    async fn put(&self, key: &str, value: V) -> CacheResult<()> {
        self.ensure_open()?;
        let payload = serde_json::to_string(&value).map_err(from_serde_error)?;
        let _existed: i64 = self
            .client
            .eval(
                scripts::PUT,
                vec![self.key(key)],
                vec![payload, self.channel.clone(), key.to_string()],
            )
            .await
            .map_err(from_redis_error)?;
        Ok(())
    }

    async fn get(&self, key: &str) -> CacheResult<Option<V>> {
        self.ensure_open()?;
        let value: Option<String> = self
            .client
            .get(self.key(key))
            .await
            .map_err(from_redis_error)?;

        value.map(|raw| decode_entry(key, &raw)).transpose()
    }

    async fn remove(&self, key: &str) -> CacheResult<()> {
        self.ensure_open()?;
        let _removed: i64 = self
            .client
            .eval(
                scripts::REMOVE,
                vec![self.key(key)],
                vec![self.channel.clone(), key.to_string()],
            )
            .await
            .map_err(from_redis_error)?;
        Ok(())
    }

    async fn replace_if_version(&self, key: &str, expected: Uuid, value: V) -> CacheResult<bool> {
        self.ensure_open()?;
        let payload = serde_json::to_string(&value).map_err(from_serde_error)?;
        let replaced: i64 = self
            .client
            .eval(
                scripts::REPLACE_IF_VERSION,
                vec![self.key(key)],
                vec![
                    payload,
                    expected.to_string(),
                    self.channel.clone(),
                    key.to_string(),
                ],
            )
            .await
            .map_err(from_redis_error)?;
        Ok(replaced == 1)
    }

    async fn add_listener(&self, listener: Arc<dyn CacheEntryListener>) -> CacheResult<ListenerId> {
        self.ensure_open()?;
        self.ensure_subscribed().await?;
        let id = self.listeners.register(listener);
        self.owned.lock().push(id);
        Ok(id)
    }

    async fn remove_listener(&self, id: ListenerId) -> CacheResult<()> {
        self.owned.lock().retain(|owned| *owned != id);
        self.listeners.unregister(id).await;
        Ok(())
    }

    async fn close(&self) -> CacheResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.stop_subscription().await;
        self.owned.lock().clear();
        let dropped = self.listeners.shutdown().await;
        self.client.quit().await.map_err(from_redis_error)?;

        tracing::info!(
            cache = %self.name,
            site = %self.site,
            dropped_events = dropped,
            "redis tier handle closed"
        );
        Ok(())
    }
}

/// Connector opening one Redis connection per site and cache.
#[derive(Debug, Clone)]
pub struct RedisConnector {
    config: RedisConfig,
}

impl RedisConnector {
    /// Creates a connector for the given server.
    #[must_use]
    pub const fn new(config: RedisConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl<V> RemoteConnector<V> for RedisConnector
where
    V: CacheEntity + Serialize + DeserializeOwned,
{
    async fn connect(
        &self,
        site: &SiteId,
        cache_name: &str,
    ) -> CacheResult<Arc<dyn RemoteCache<V>>> {
        let cache =
            RedisRemoteCache::<V>::connect(self.config.clone(), site.clone(), cache_name).await?;
        Ok(Arc::new(cache))
    }
}

async fn forward_events(
    mut rx: broadcast::Receiver<Message>,
    channel: String,
    listeners: Arc<ListenerRegistry>,
) {
    loop {
        match rx.recv().await {
            Ok(message) => {
                if &*message.channel != channel.as_str() {
                    continue;
                }
                let Some(payload) = message.value.as_string() else {
                    tracing::warn!(channel = %channel, "non-text change event ignored");
                    continue;
                };
                match serde_json::from_str::<CacheEntryEvent>(&payload) {
                    Ok(event) => listeners.publish(&event),
                    Err(err) => {
                        tracing::warn!(channel = %channel, error = %err, "malformed change event");
                    }
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(channel = %channel, skipped, "subscriber lagged, change events lost");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

fn redis_config(config: &RedisConfig) -> CacheResult<Config> {
    Config::from_url(&config.connection_url()).map_err(|e| CacheError::Configuration(e.to_string()))
}

fn performance_config(config: &RedisConfig) -> PerformanceConfig {
    PerformanceConfig {
        default_command_timeout: config.command_timeout(),
        ..PerformanceConfig::default()
    }
}

fn connection_config(config: &RedisConfig) -> ConnectionConfig {
    ConnectionConfig {
        connection_timeout: config.connect_timeout(),
        ..ConnectionConfig::default()
    }
}

fn reconnect_policy() -> ReconnectPolicy {
    ReconnectPolicy::new_exponential(0, 1000, 30_000, 2)
}

/// Decodes a stored value and checks it belongs to `key`.
fn decode_entry<V>(key: &str, raw: &str) -> CacheResult<V>
where
    V: CacheEntity + DeserializeOwned,
{
    let value: V = serde_json::from_str(raw).map_err(from_serde_error)?;
    if value.cache_key() != key {
        return Err(CacheError::Serialization(format!(
            "entry stored under {key} carries key {}",
            value.cache_key()
        )));
    }
    value.validate()?;
    Ok(value)
}

fn redacted_url(config: &RedisConfig) -> String {
    let mut shown = config.clone();
    if shown.password.is_some() {
        shown.password = Some("***".to_string());
    }
    shown.connection_url()
}
