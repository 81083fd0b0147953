//! Change events emitted by the remote tier.
//!
//! Every mutation on the tier produces one event carrying only the key.
//! Events reach listeners asynchronously, after the mutating call returned,
//! and listeners must tolerate duplicate or reordered delivery.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of mutation an event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheEntryEventKind {
    /// A key that was absent got a value.
    Created,
    /// An existing value was overwritten.
    Modified,
    /// An existing value was deleted.
    Removed,
}

impl fmt::Display for CacheEntryEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => f.write_str("created"),
            Self::Modified => f.write_str("modified"),
            Self::Removed => f.write_str("removed"),
        }
    }
}

/// A change notification for a single key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntryEvent {
    /// What happened to the key.
    pub kind: CacheEntryEventKind,
    /// The affected key.
    pub key: String,
}

impl CacheEntryEvent {
    /// Creates a `Created` event.
    #[must_use]
    pub fn created(key: impl Into<String>) -> Self {
        Self {
            kind: CacheEntryEventKind::Created,
            key: key.into(),
        }
    }

    /// Creates a `Modified` event.
    #[must_use]
    pub fn modified(key: impl Into<String>) -> Self {
        Self {
            kind: CacheEntryEventKind::Modified,
            key: key.into(),
        }
    }

    /// Creates a `Removed` event.
    #[must_use]
    pub fn removed(key: impl Into<String>) -> Self {
        Self {
            kind: CacheEntryEventKind::Removed,
            key: key.into(),
        }
    }
}

/// Handle identifying a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

impl ListenerId {
    /// Allocates a fresh listener id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Receiver of remote tier change events.
///
/// Callbacks run on a dispatch task owned by the tier, never on the task
/// that issued the mutation. Implement either the per-kind methods or
/// override [`CacheEntryListener::on_event`] to handle the tagged union
/// directly.
pub trait CacheEntryListener: Send + Sync {
    /// Called after a key was created.
    fn on_created(&self, _key: &str) {}

    /// Called after a key was overwritten.
    fn on_modified(&self, _key: &str) {}

    /// Called after a key was removed.
    fn on_removed(&self, _key: &str) {}

    /// Dispatches an event to the matching per-kind callback.
    fn on_event(&self, event: &CacheEntryEvent) {
        match event.kind {
            CacheEntryEventKind::Created => self.on_created(&event.key),
            CacheEntryEventKind::Modified => self.on_modified(&event.key),
            CacheEntryEventKind::Removed => self.on_removed(&event.key),
        }
    }
}
