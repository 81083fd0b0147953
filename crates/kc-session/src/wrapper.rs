//! Versioned wrapper for cached session entities.

use std::hash::{Hash, Hasher};

use kc_cache::{CacheEntity, CacheError, CacheResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::SessionResult;
use crate::user_session::UserSessionEntity;

/// An entity that is keyed by its own identifier.
pub trait SessionEntity: Clone + Send + Sync + 'static {
    /// Identifier the entity is cached under.
    fn id(&self) -> &str;

    /// Checks the entity invariants.
    ///
    /// ## Errors
    ///
    /// Returns the first violated invariant.
    fn validate(&self) -> SessionResult<()> {
        Ok(())
    }
}

impl SessionEntity for UserSessionEntity {
    fn id(&self) -> &str {
        UserSessionEntity::id(self)
    }

    fn validate(&self) -> SessionResult<()> {
        UserSessionEntity::validate(self)
    }
}

/// A session entity plus the version token used for optimistic replace.
///
/// Two wrappers are equal when they wrap the same key, regardless of
/// version or content. Use [`SessionEntityWrapper::same_version`] to compare
/// tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionEntityWrapper<T> {
    version: Uuid,
    entity: T,
}

impl<T: SessionEntity> SessionEntityWrapper<T> {
    /// Wraps an entity under a fresh version.
    #[must_use]
    pub fn new(entity: T) -> Self {
        Self {
            version: Uuid::new_v4(),
            entity,
        }
    }

    /// Builds the successor of this wrapper for an optimistic replace.
    ///
    /// The result carries a new version; pass `self.version()` as the
    /// expected version to the tier.
    #[must_use]
    pub fn next_version(&self, entity: T) -> Self {
        let mut version = Uuid::new_v4();
        while version == self.version {
            version = Uuid::new_v4();
        }
        Self { version, entity }
    }

    /// The wrapped entity.
    #[must_use]
    pub const fn entity(&self) -> &T {
        &self.entity
    }

    /// Unwraps the entity.
    #[must_use]
    pub fn into_entity(self) -> T {
        self.entity
    }

    /// The version token.
    #[must_use]
    pub const fn version(&self) -> Uuid {
        self.version
    }

    /// Returns whether both wrappers carry the same version token.
    #[must_use]
    pub fn same_version(&self, other: &Self) -> bool {
        self.version == other.version
    }
}

impl<T: SessionEntity> PartialEq for SessionEntityWrapper<T> {
    fn eq(&self, other: &Self) -> bool {
        self.entity.id() == other.entity.id()
    }
}

impl<T: SessionEntity> Eq for SessionEntityWrapper<T> {}

impl<T: SessionEntity> Hash for SessionEntityWrapper<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.entity.id().hash(state);
    }
}

impl<T: SessionEntity> CacheEntity for SessionEntityWrapper<T> {
    fn cache_key(&self) -> &str {
        self.entity.id()
    }

    fn version(&self) -> Uuid {
        self.version
    }

    fn validate(&self) -> CacheResult<()> {
        SessionEntity::validate(&self.entity)
            .map_err(|err| CacheError::Serialization(err.to_string()))
    }
}

/// Wrapped user session, the value type of the session cache.
pub type UserSessionWrapper = SessionEntityWrapper<UserSessionEntity>;
