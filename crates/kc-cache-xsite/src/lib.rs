//! # kc-cache-xsite
//!
//! Cross-site session caching for Keycloak Rust.
//!
//! Each site keeps a [`LocalCache`] in front of a shared remote tier. Writes
//! go through to the tier; removals made on another site reach the local
//! cache asynchronously through an [`InvalidationPropagator`] registered on
//! the site's remote handle.
//!
//! The tier is the source of truth: once a remove returns, no site may read
//! the key from the tier again. Local caches only converge eventually. The
//! [`ConsistencyChecker`] and [`RemoveWorker`] check both guarantees.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use kc_cache::{InMemoryTierRegistry, RemoteConnector, TierOptions};
//! use kc_cache_xsite::{CacheManager, fixture::sample_session};
//!
//! let registry = Arc::new(InMemoryTierRegistry::new(TierOptions::default()));
//! let dc1 = CacheManager::create("dc1", registry.clone() as Arc<dyn RemoteConnector<_>>);
//! let sessions = dc1.get_cache("sessions").await?;
//! sessions.put("42", sample_session("42")).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod checker;
pub mod config;
pub mod error;
pub mod fixture;
pub mod listener;
pub mod local;
pub mod manager;
pub mod site;
pub mod worker;

pub use checker::{ConsistencyChecker, KeyState, Presence};
pub use config::XSiteConfig;
pub use error::{XSiteError, XSiteResult};
pub use listener::{InvalidationPropagator, ListenerStats, ListenerStatsSnapshot};
pub use local::{remote_cache_for, LocalCache};
pub use manager::CacheManager;
pub use site::SiteCoordinator;
pub use worker::{RemoveWorker, WorkerReport};

/// Local cache of wrapped user sessions.
pub type SessionCache = LocalCache<kc_session::UserSessionWrapper>;
