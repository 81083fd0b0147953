//! Authenticated client session entity.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

/// State of one client within a user session.
///
/// Embedded in its parent [`UserSessionEntity`](crate::UserSessionEntity)
/// and replicated with it; it has no cache entry of its own. Mappers and
/// roles are carried as opaque names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedClientSessionEntity {
    /// Protocol used to authenticate the client (openid-connect, saml).
    pub auth_method: String,
    /// Action being performed (if any).
    pub action: Option<String>,
    /// Last timestamp recorded for the client (epoch seconds).
    pub timestamp: i64,
    /// Protocol mapper names applied to the client.
    pub protocol_mappers: HashSet<String>,
    /// Role names granted to the client.
    pub roles: HashSet<String>,
    /// Client session notes.
    #[serde(default)]
    pub notes: HashMap<String, String>,
}

impl AuthenticatedClientSessionEntity {
    /// Creates a client session for the given protocol.
    #[must_use]
    pub fn new(auth_method: impl Into<String>) -> Self {
        Self {
            auth_method: auth_method.into(),
            ..Self::default()
        }
    }

    /// Sets the current action.
    #[must_use]
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Sets the timestamp.
    #[must_use]
    pub const fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Adds protocol mappers.
    #[must_use]
    pub fn with_protocol_mappers(
        mut self,
        mappers: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.protocol_mappers
            .extend(mappers.into_iter().map(Into::into));
        self
    }

    /// Adds roles.
    #[must_use]
    pub fn with_roles(mut self, roles: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.roles.extend(roles.into_iter().map(Into::into));
        self
    }

    /// Checks if a role is granted.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    /// Sets a client session note.
    pub fn set_note(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.notes.insert(key.into(), value.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_mappers_and_roles() {
        let session = AuthenticatedClientSessionEntity::new("saml")
            .with_action("something")
            .with_timestamp(1234)
            .with_protocol_mappers(["mapper1", "mapper2"])
            .with_roles(["role1", "role2"]);

        assert_eq!(session.auth_method, "saml");
        assert_eq!(session.action.as_deref(), Some("something"));
        assert_eq!(session.timestamp, 1234);
        assert_eq!(session.protocol_mappers.len(), 2);
        assert!(session.has_role("role1"));
        assert!(!session.has_role("admin"));
    }
}
