//! Session fixtures used by validation runs.

use kc_session::{AuthenticatedClientSessionEntity, UserSessionEntity, UserSessionWrapper};

/// Builds the wrapped session written by validation runs.
///
/// Every session carries one SAML client session so the serialized payload
/// has a realistic shape.
#[must_use]
pub fn sample_session(id: &str) -> UserSessionWrapper {
    let mut session = UserSessionEntity::new(id, "foo", "foo")
        .with_login_username("foo")
        .with_ip_address("123.44.143.178")
        .with_broker(Some("!23123123".to_string()), None);

    let client_session = AuthenticatedClientSessionEntity::new("saml")
        .with_action("something")
        .with_timestamp(1234)
        .with_protocol_mappers(["mapper1", "mapper2"])
        .with_roles(["role1", "role2"]);
    session.add_client_session("client1", client_session);

    UserSessionWrapper::new(session)
}

/// Session identifiers `"0"` up to `count - 1`.
#[must_use]
pub fn session_ids(count: usize) -> Vec<String> {
    (0..count).map(|i| i.to_string()).collect()
}
