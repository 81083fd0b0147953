//! # kc-cache-redis
//!
//! Redis remote cache tier for Keycloak Rust.
//!
//! This crate implements the `kc-cache` remote tier on top of Redis using
//! the `fred` crate. Every site opens its own connection to the same
//! server, which makes the server the single source of truth.
//!
//! ## Features
//!
//! - Connection with automatic reconnection
//! - TLS support
//! - Key prefixing for multi-tenant deployments
//! - Atomic write + change event publication through Lua scripts
//! - Pub/sub subscriber feeding the asynchronous listener path
//!
//! ## Example
//!
//! ```ignore
//! use kc_cache::{RemoteCache, SiteId};
//! use kc_cache_redis::{RedisConfig, RedisRemoteCache};
//! use kc_session::UserSessionWrapper;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RedisConfig::default().host("localhost").port(6379);
//!
//!     let dc1 = RedisRemoteCache::<UserSessionWrapper>::connect(config.clone(), SiteId::new("dc1"), "sessions").await?;
//!     let dc2 = RedisRemoteCache::<UserSessionWrapper>::connect(config, SiteId::new("dc2"), "sessions").await?;
//!
//!     dc1.remove("42").await?;
//!     assert!(dc2.get("42").await?.is_none());
//!
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod provider;
pub mod scripts;

pub use config::RedisConfig;
pub use provider::{RedisConnector, RedisRemoteCache};
