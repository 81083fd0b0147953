//! # kc-session
//!
//! Session entities for Keycloak Rust.
//!
//! This crate holds the user session entity replicated through the
//! cross-site session cache, its embedded client sessions, and the
//! versioned wrapper the cache stores.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client_session;
pub mod error;
pub mod user_session;
pub mod wrapper;

pub use client_session::AuthenticatedClientSessionEntity;
pub use error::{SessionError, SessionResult};
pub use user_session::UserSessionEntity;
pub use wrapper::{SessionEntity, SessionEntityWrapper, UserSessionWrapper};
