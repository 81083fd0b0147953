//! Consistency assertions for cross-site runs.
//!
//! The remote tier must never serve a removed key to any site once the
//! remove call has returned. Local caches are only required to catch up
//! within a grace period.

use std::fmt;
use std::time::Duration;

use kc_cache::{CacheEntity, RemoteCache, SiteId};
use serde::Serialize;
use tokio::time::Instant;

use crate::error::{XSiteError, XSiteResult};
use crate::local::LocalCache;

/// Whether the tier holds a key, as seen through one remote handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    /// Key not found.
    Absent,
    /// Key found.
    Present,
}

impl fmt::Display for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => write!(f, "absent"),
            Self::Present => write!(f, "present"),
        }
    }
}

/// State of one key from one site's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyState {
    /// Neither the tier nor the local cache holds the key.
    Absent,
    /// Both hold the key.
    PresentRemoteAndLocal,
    /// The tier holds the key; the local cache has not loaded it.
    PresentRemoteOnly,
    /// The tier dropped the key but the local copy is not yet invalidated.
    PendingLocalInvalidation,
}

impl KeyState {
    /// Combines tier and local presence.
    #[must_use]
    pub const fn from_presence(remote: bool, local: bool) -> Self {
        match (remote, local) {
            (false, false) => Self::Absent,
            (true, true) => Self::PresentRemoteAndLocal,
            (true, false) => Self::PresentRemoteOnly,
            (false, true) => Self::PendingLocalInvalidation,
        }
    }

    /// Returns whether the tier holds the key.
    #[must_use]
    pub const fn remote(self) -> Presence {
        match self {
            Self::PresentRemoteAndLocal | Self::PresentRemoteOnly => Presence::Present,
            Self::Absent | Self::PendingLocalInvalidation => Presence::Absent,
        }
    }
}

impl fmt::Display for KeyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Absent => "absent",
            Self::PresentRemoteAndLocal => "present (remote and local)",
            Self::PresentRemoteOnly => "present (remote only)",
            Self::PendingLocalInvalidation => "pending local invalidation",
        };
        f.write_str(label)
    }
}

/// Checks tier and local cache state on behalf of one worker.
#[derive(Debug, Clone)]
pub struct ConsistencyChecker {
    worker: String,
}

impl ConsistencyChecker {
    /// Creates a checker reporting violations as `worker`.
    #[must_use]
    pub fn new(worker: impl Into<String>) -> Self {
        Self {
            worker: worker.into(),
        }
    }

    /// Name reported in violations.
    #[must_use]
    pub fn worker(&self) -> &str {
        &self.worker
    }

    /// Reads the state of `key` from the site owning `local`.
    ///
    /// The local cache is inspected without loading from the tier.
    ///
    /// ## Errors
    ///
    /// Returns [`XSiteError::Transport`] if the tier read fails.
    pub async fn observe<V: CacheEntity>(
        &self,
        local: &LocalCache<V>,
        key: &str,
    ) -> XSiteResult<KeyState> {
        let remote = local.remote().get(key).await?.is_some();
        Ok(KeyState::from_presence(remote, local.contains(key)))
    }

    /// Asserts that the tier no longer serves `key` through `observer`.
    ///
    /// ## Errors
    ///
    /// Returns [`XSiteError::ConsistencyViolation`] if the key is still
    /// found, or [`XSiteError::Transport`] if the read fails.
    pub async fn expect_remote_absent<V: CacheEntity>(
        &self,
        observer: &dyn RemoteCache<V>,
        origin: &SiteId,
        key: &str,
    ) -> XSiteResult<()> {
        if observer.get(key).await?.is_none() {
            return Ok(());
        }

        tracing::error!(
            key,
            observer = %observer.site(),
            origin = %origin,
            worker = %self.worker,
            "removed session still present"
        );
        Err(XSiteError::ConsistencyViolation {
            key: key.to_string(),
            observer: observer.site().clone(),
            origin: origin.clone(),
            expected: Presence::Absent,
            observed: Presence::Present,
            worker: self.worker.clone(),
        })
    }

    /// Asserts that `key` is readable through `observer` and returns it.
    ///
    /// ## Errors
    ///
    /// Returns [`XSiteError::MissingAfterPut`] if the key is absent or the
    /// value read carries another key.
    pub async fn expect_remote_present<V: CacheEntity>(
        &self,
        observer: &dyn RemoteCache<V>,
        key: &str,
    ) -> XSiteResult<V> {
        match observer.get(key).await? {
            Some(value) if value.cache_key() == key => Ok(value),
            _ => {
                tracing::error!(
                    key,
                    site = %observer.site(),
                    worker = %self.worker,
                    "session missing after put"
                );
                Err(XSiteError::MissingAfterPut {
                    key: key.to_string(),
                    site: observer.site().clone(),
                })
            }
        }
    }

    /// Asserts that every key in `keys` is readable through `observer`.
    ///
    /// ## Errors
    ///
    /// Stops at the first missing key; see [`Self::expect_remote_present`].
    pub async fn expect_all_present<V: CacheEntity>(
        &self,
        observer: &dyn RemoteCache<V>,
        keys: &[String],
    ) -> XSiteResult<usize> {
        for key in keys {
            self.expect_remote_present(observer, key).await?;
        }
        Ok(keys.len())
    }

    /// Waits until none of `keys` has a local copy in `local`.
    ///
    /// ## Errors
    ///
    /// Returns [`XSiteError::ConvergenceTimeout`] listing the keys still
    /// present once `grace` has elapsed.
    pub async fn await_local_convergence<V: CacheEntity>(
        &self,
        local: &LocalCache<V>,
        keys: &[String],
        grace: Duration,
        poll: Duration,
    ) -> XSiteResult<()> {
        let started = Instant::now();
        let deadline = started + grace;
        loop {
            let remaining: Vec<String> = keys
                .iter()
                .filter(|key| local.contains(key))
                .cloned()
                .collect();
            if remaining.is_empty() {
                tracing::debug!(site = %local.site(), waited = ?started.elapsed(), "local cache converged");
                return Ok(());
            }
            if Instant::now() >= deadline {
                tracing::error!(
                    site = %local.site(),
                    remaining = remaining.len(),
                    "local cache did not converge"
                );
                return Err(XSiteError::ConvergenceTimeout {
                    site: local.site().clone(),
                    remaining,
                    waited: started.elapsed(),
                });
            }
            tokio::time::sleep(poll).await;
        }
    }
}
