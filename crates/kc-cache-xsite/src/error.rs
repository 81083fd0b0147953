//! Cross-site error types.

use std::time::Duration;

use kc_cache::{CacheError, SiteId};
use thiserror::Error;

use crate::checker::Presence;

/// Errors raised by cross-site cache operations and validation runs.
#[derive(Debug, Error)]
pub enum XSiteError {
    /// A read through a remote handle contradicted a completed remove.
    #[error(
        "consistency violation for key {key}: expected {expected} via {observer}, \
         observed {observed} (removed on {origin}, worker {worker})"
    )]
    ConsistencyViolation {
        /// Key that was checked.
        key: String,
        /// Site whose remote handle served the read.
        observer: SiteId,
        /// Site that issued the remove.
        origin: SiteId,
        /// State the protocol guarantees.
        expected: Presence,
        /// State actually read.
        observed: Presence,
        /// Worker that made the observation.
        worker: String,
    },

    /// A key written to the tier could not be read back.
    #[error("session {key} missing via {site} after put")]
    MissingAfterPut {
        /// Key that was written.
        key: String,
        /// Site whose remote handle served the read.
        site: SiteId,
    },

    /// A local cache did not catch up within the grace period.
    #[error("local cache on {site} still holds {} removed keys after {waited:?}", .remaining.len())]
    ConvergenceTimeout {
        /// Site whose local cache lagged.
        site: SiteId,
        /// Keys still present locally.
        remaining: Vec<String>,
        /// How long the check waited.
        waited: Duration,
    },

    /// Remote tier transport failure.
    #[error(transparent)]
    Transport(#[from] CacheError),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The cache manager of the site was already stopped.
    #[error("cache manager for site {0} is stopped")]
    Stopped(SiteId),
}

impl XSiteError {
    /// Returns whether this error is a failed consistency assertion rather
    /// than an operational failure.
    #[must_use]
    pub const fn is_violation(&self) -> bool {
        matches!(
            self,
            Self::ConsistencyViolation { .. }
                | Self::MissingAfterPut { .. }
                | Self::ConvergenceTimeout { .. }
        )
    }
}

/// Result type for cross-site operations.
pub type XSiteResult<T> = Result<T, XSiteError>;
