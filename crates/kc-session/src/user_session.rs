//! User session (SSO session) entity.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::client_session::AuthenticatedClientSessionEntity;
use crate::error::{SessionError, SessionResult};

/// A user session as stored in the session cache.
///
/// The identifier doubles as the cache key and cannot change once the
/// entity exists. `last_session_refresh` only ever moves forward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSessionEntity {
    // === Identity ===
    id: String,
    /// Realm this session belongs to.
    pub realm_id: String,
    /// User who owns this session.
    pub user: String,

    // === Authentication Info ===
    /// Broker session ID (for federated logins).
    pub broker_session_id: Option<String>,
    /// Broker user ID (for federated logins).
    pub broker_user_id: Option<String>,
    /// Username typed at login.
    pub login_username: String,
    /// IP address the login originated from.
    pub ip_address: String,

    // === Timestamps ===
    started: DateTime<Utc>,
    last_session_refresh: DateTime<Utc>,

    // === Client Sessions ===
    /// Client sessions keyed by client id.
    #[serde(default)]
    pub authenticated_client_sessions: HashMap<String, AuthenticatedClientSessionEntity>,

    // === Notes ===
    /// Session notes (key-value pairs for custom data).
    #[serde(default)]
    pub notes: HashMap<String, String>,
}

impl UserSessionEntity {
    /// Creates a session started now.
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        realm_id: impl Into<String>,
        user: impl Into<String>,
    ) -> Self {
        Self::started_at(id, realm_id, user, Utc::now())
    }

    /// Creates a session with an explicit start time.
    #[must_use]
    pub fn started_at(
        id: impl Into<String>,
        realm_id: impl Into<String>,
        user: impl Into<String>,
        started: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            realm_id: realm_id.into(),
            user: user.into(),
            broker_session_id: None,
            broker_user_id: None,
            login_username: String::new(),
            ip_address: String::new(),
            started,
            last_session_refresh: started,
            authenticated_client_sessions: HashMap::new(),
            notes: HashMap::new(),
        }
    }

    /// Sets the login username.
    #[must_use]
    pub fn with_login_username(mut self, username: impl Into<String>) -> Self {
        self.login_username = username.into();
        self
    }

    /// Sets the IP address.
    #[must_use]
    pub fn with_ip_address(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = ip.into();
        self
    }

    /// Sets the broker session and user ids.
    #[must_use]
    pub fn with_broker(mut self, session_id: Option<String>, user_id: Option<String>) -> Self {
        self.broker_session_id = session_id;
        self.broker_user_id = user_id;
        self
    }

    /// Session identifier (the cache key).
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// When the session started.
    #[must_use]
    pub const fn started(&self) -> DateTime<Utc> {
        self.started
    }

    /// When the session was last refreshed.
    #[must_use]
    pub const fn last_session_refresh(&self) -> DateTime<Utc> {
        self.last_session_refresh
    }

    /// Records a refresh at `at`.
    ///
    /// A refresh older than the current one is ignored.
    pub fn refresh(&mut self, at: DateTime<Utc>) {
        if at > self.last_session_refresh {
            self.last_session_refresh = at;
        }
    }

    /// Records a refresh now.
    pub fn touch(&mut self) {
        self.refresh(Utc::now());
    }

    /// Attaches a client session, replacing any previous one for the client.
    pub fn add_client_session(
        &mut self,
        client_id: impl Into<String>,
        session: AuthenticatedClientSessionEntity,
    ) {
        self.authenticated_client_sessions
            .insert(client_id.into(), session);
    }

    /// Gets the client session for a client.
    #[must_use]
    pub fn client_session(&self, client_id: &str) -> Option<&AuthenticatedClientSessionEntity> {
        self.authenticated_client_sessions.get(client_id)
    }

    /// Detaches the client session for a client.
    ///
    /// ## Errors
    ///
    /// Returns `ClientSessionNotFound` if the client has no session.
    pub fn remove_client_session(
        &mut self,
        client_id: &str,
    ) -> SessionResult<AuthenticatedClientSessionEntity> {
        self.authenticated_client_sessions
            .remove(client_id)
            .ok_or_else(|| SessionError::ClientSessionNotFound(client_id.to_string()))
    }

    /// Sets a session note.
    pub fn set_note(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.notes.insert(key.into(), value.into());
    }

    /// Gets a session note.
    #[must_use]
    pub fn get_note(&self, key: &str) -> Option<&str> {
        self.notes.get(key).map(String::as_str)
    }

    /// Checks the entity invariants.
    ///
    /// Entities decoded from the wire bypass the constructors. Serializing
    /// tiers reject them through [`kc_cache::CacheEntity::validate`] on the
    /// wrapper.
    ///
    /// ## Errors
    ///
    /// Returns `Invalid` for an empty id or a refresh earlier than the start.
    pub fn validate(&self) -> SessionResult<()> {
        if self.id.is_empty() {
            return Err(SessionError::Invalid("empty session id".to_string()));
        }
        if self.last_session_refresh < self.started {
            return Err(SessionError::Invalid(format!(
                "session {} refreshed before it started",
                self.id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn session() -> UserSessionEntity {
        UserSessionEntity::new("123", "foo", "foo")
            .with_login_username("foo")
            .with_ip_address("123.44.143.178")
            .with_broker(Some("!23123123".to_string()), None)
    }

    #[test]
    fn new_session_starts_refreshed() {
        let session = session();
        assert_eq!(session.id(), "123");
        assert_eq!(session.started(), session.last_session_refresh());
        assert!(session.validate().is_ok());
    }

    #[test]
    fn refresh_never_moves_backwards() {
        let mut session = session();
        let start = session.started();

        session.refresh(start + Duration::seconds(30));
        assert_eq!(session.last_session_refresh(), start + Duration::seconds(30));

        session.refresh(start + Duration::seconds(10));
        assert_eq!(session.last_session_refresh(), start + Duration::seconds(30));
    }

    #[test]
    fn client_sessions_are_embedded() {
        let mut session = session();
        session.add_client_session(
            "client1",
            AuthenticatedClientSessionEntity::new("saml").with_roles(["role1"]),
        );

        assert!(session.client_session("client1").is_some());
        assert!(session.remove_client_session("client1").is_ok());
        assert_eq!(
            session.remove_client_session("client1").unwrap_err(),
            SessionError::ClientSessionNotFound("client1".to_string())
        );
    }

    #[test]
    fn validate_rejects_broken_entities() {
        let empty = UserSessionEntity::new("", "foo", "foo");
        assert!(matches!(empty.validate(), Err(SessionError::Invalid(_))));

        let json = r#"{
            "id": "1", "realm_id": "foo", "user": "foo",
            "broker_session_id": null, "broker_user_id": null,
            "login_username": "foo", "ip_address": "10.0.0.1",
            "started": "2024-01-01T00:00:10Z",
            "last_session_refresh": "2024-01-01T00:00:00Z"
        }"#;
        let decoded: UserSessionEntity = serde_json::from_str(json).unwrap();
        assert!(decoded.validate().is_err());
    }

    #[test]
    fn session_notes() {
        let mut session = session();
        session.set_note("AUTH_CLIENT_ID", "my-app");
        assert_eq!(session.get_note("AUTH_CLIENT_ID"), Some("my-app"));
        assert_eq!(session.get_note("missing"), None);
    }
}
