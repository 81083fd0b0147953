//! Cache error types.

use std::fmt;

/// Cache operation errors.
///
/// Every variant describes a failure talking to the remote tier. A missing
/// key is never an error: reads return `None` and removes succeed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Connection to cache backend failed.
    Connection(String),
    /// Serialization/deserialization error.
    Serialization(String),
    /// Cache operation timed out.
    Timeout,
    /// Invalid cache configuration.
    Configuration(String),
    /// The handle was closed before the operation was issued.
    Closed(String),
    /// Internal cache error.
    Internal(String),
}

impl CacheError {
    /// Returns whether this error came from the transport between a site
    /// and the remote tier.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Timeout | Self::Serialization(_)
        )
    }
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(msg) => write!(f, "cache connection error: {msg}"),
            Self::Serialization(msg) => write!(f, "cache serialization error: {msg}"),
            Self::Timeout => write!(f, "cache operation timed out"),
            Self::Configuration(msg) => write!(f, "cache configuration error: {msg}"),
            Self::Closed(name) => write!(f, "cache handle closed: {name}"),
            Self::Internal(msg) => write!(f, "internal cache error: {msg}"),
        }
    }
}

impl std::error::Error for CacheError {}

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
