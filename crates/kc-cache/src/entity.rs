//! Values stored in the remote tier and the sites that address it.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CacheResult;

/// Identifier of a site (data center) sharing the remote tier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteId(String);

impl SiteId {
    /// Creates a site identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SiteId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for SiteId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A value that can live in the remote tier.
///
/// Entries are identified by their key; the version token is opaque and only
/// compared for equality by optimistic replace.
pub trait CacheEntity: Clone + Send + Sync + 'static {
    /// Key the entry is stored under.
    fn cache_key(&self) -> &str;

    /// Version token of this particular value.
    fn version(&self) -> Uuid;

    /// Checks the invariants of a value decoded from the tier.
    ///
    /// Tiers that store serialized values call this before handing a value
    /// out. The default accepts everything.
    ///
    /// ## Errors
    ///
    /// Returns [`crate::CacheError::Serialization`] describing the violation.
    fn validate(&self) -> CacheResult<()> {
        Ok(())
    }
}
