//! Redis connection configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

/// Redis connection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis server host.
    #[serde(default = "default_host")]
    pub host: String,
    /// Redis server port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// ACL username (optional).
    pub username: Option<String>,
    /// Redis password (optional).
    pub password: Option<String>,
    /// Redis database number.
    #[serde(default)]
    pub database: u8,
    /// Use TLS for connection.
    #[serde(default)]
    pub tls: bool,
    /// Connection timeout in milliseconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,
    /// Command timeout in milliseconds.
    #[serde(default = "default_command_timeout")]
    pub command_timeout_ms: u64,
    /// How long closing a listener waits for queued events, in milliseconds.
    #[serde(default = "default_drain_timeout")]
    pub drain_timeout_ms: u64,
    /// Key prefix for all cache keys.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            username: None,
            password: None,
            database: 0,
            tls: false,
            connect_timeout_ms: default_connect_timeout(),
            command_timeout_ms: default_command_timeout(),
            drain_timeout_ms: default_drain_timeout(),
            key_prefix: default_key_prefix(),
        }
    }
}

impl RedisConfig {
    /// Creates a new Redis configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a `redis://[[username]:password@]host[:port][/db]` URL.
    ///
    /// `rediss://` enables TLS. Query parameters are ignored. Credentials
    /// are kept percent-encoded as written. Returns `None` for other schemes
    /// or malformed URLs.
    #[must_use]
    pub fn from_url(raw: &str) -> Option<Self> {
        let url = Url::parse(raw).ok()?;
        let tls = match url.scheme() {
            "redis" => false,
            "rediss" => true,
            _ => return None,
        };
        let host = url.host_str().filter(|host| !host.is_empty())?;
        let database = match url.path().trim_start_matches('/') {
            "" => 0,
            db => db.parse().ok()?,
        };

        Some(Self {
            host: host.to_string(),
            port: url.port().unwrap_or_else(default_port),
            username: Some(url.username())
                .filter(|user| !user.is_empty())
                .map(ToString::to_string),
            password: url.password().map(ToString::to_string),
            database,
            tls,
            ..Self::default()
        })
    }

    /// Sets the Redis host.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the Redis port.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the ACL username.
    #[must_use]
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Sets the Redis password.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Sets the Redis database number.
    #[must_use]
    pub const fn database(mut self, database: u8) -> Self {
        self.database = database;
        self
    }

    /// Enables TLS.
    #[must_use]
    pub const fn tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    /// Sets the key prefix.
    #[must_use]
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Sets the listener drain timeout.
    #[must_use]
    pub const fn drain_timeout_ms(mut self, millis: u64) -> Self {
        self.drain_timeout_ms = millis;
        self
    }

    /// Builds the Redis connection URL.
    #[must_use]
    pub fn connection_url(&self) -> String {
        let scheme = if self.tls { "rediss" } else { "redis" };
        let plain = format!(
            "{scheme}://{host}:{port}/{db}",
            host = self.host,
            port = self.port,
            db = self.database
        );
        let Ok(mut url) = Url::parse(&plain) else {
            return plain;
        };
        if let Some(username) = &self.username {
            let _ = url.set_username(username);
        }
        if let Some(password) = &self.password {
            let _ = url.set_password(Some(password));
        }
        url.into()
    }

    /// Formats a key with the configured prefix.
    #[must_use]
    pub fn prefixed_key(&self, key: &str) -> String {
        if self.key_prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", self.key_prefix, key)
        }
    }

    /// Redis key holding `key` of the named cache.
    #[must_use]
    pub fn entry_key(&self, cache_name: &str, key: &str) -> String {
        self.prefixed_key(&format!("{cache_name}:{key}"))
    }

    /// Pub/sub channel carrying change events of the named cache.
    #[must_use]
    pub fn event_channel(&self, cache_name: &str) -> String {
        self.prefixed_key(&format!("events:{cache_name}"))
    }

    /// Connection timeout.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Command timeout.
    #[must_use]
    pub const fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Listener drain timeout.
    #[must_use]
    pub const fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

fn default_host() -> String {
    "localhost".to_string()
}

const fn default_port() -> u16 {
    6379
}

const fn default_connect_timeout() -> u64 {
    5000
}

const fn default_command_timeout() -> u64 {
    2000
}

const fn default_drain_timeout() -> u64 {
    2000
}

fn default_key_prefix() -> String {
    "kc".to_string()
}
