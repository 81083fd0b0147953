//! # kc-cache
//!
//! Remote cache tier abstraction for Keycloak Rust.
//!
//! This crate defines the interface every site uses to reach the shared
//! remote tier, the change events the tier emits, and an in-process tier
//! used by tests and local validation runs. The Redis implementation lives
//! in `kc-cache-redis`.
//!
//! ## Contents
//!
//! - [`RemoteCache`] - Strongly consistent get/put/remove plus listeners
//! - [`RemoteConnector`] - Opens a site's handle to a named cache
//! - [`CacheEntryEvent`] / [`CacheEntryListener`] - Typed change events
//! - [`ListenerRegistry`] - Asynchronous, per-listener event delivery
//! - [`InMemoryRemoteTier`] - Shared in-process tier
//!
//! ## Example
//!
//! ```ignore
//! use kc_cache::{InMemoryRemoteTier, RemoteCache};
//!
//! let tier = InMemoryRemoteTier::new("sessions");
//! let dc1 = tier.handle("dc1");
//! let dc2 = tier.handle("dc2");
//!
//! dc1.remove("42").await?;
//! assert!(dc2.get("42").await?.is_none());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod dispatch;
pub mod entity;
pub mod error;
pub mod event;
pub mod memory;
pub mod provider;

pub use dispatch::ListenerRegistry;
pub use entity::{CacheEntity, SiteId};
pub use error::{CacheError, CacheResult};
pub use event::{CacheEntryEvent, CacheEntryEventKind, CacheEntryListener, ListenerId};
pub use memory::{InMemoryRemoteCache, InMemoryRemoteTier, InMemoryTierRegistry, TierOptions};
pub use provider::{RemoteCache, RemoteConnector};
