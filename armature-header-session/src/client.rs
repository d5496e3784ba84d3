//! Backing-client contract.
//!
//! Any key-value store can back the session middleware by implementing
//! [`SessionClient`]. Keys handed to a client are already namespaced by the
//! [`SessionStore`](crate::store::SessionStore) adapter.

use crate::error::SessionResult;
use crate::session::Session;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Availability change reported by a backing client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreEvent {
    /// Client (re)connected to its backend
    Connect,
    /// Client lost its backend
    Disconnect,
}

/// Receives availability notifications.
pub trait StoreObserver: Send + Sync {
    /// Called for every connect/disconnect signal.
    fn notify(&self, event: StoreEvent);
}

impl<F> StoreObserver for F
where
    F: Fn(StoreEvent) + Send + Sync,
{
    fn notify(&self, event: StoreEvent) {
        self(event)
    }
}

/// Storage client used by the session store adapter.
///
/// # Examples
///
/// ```ignore
/// use armature_header_session::{Session, SessionClient, SessionResult};
///
/// struct NullClient;
///
/// #[async_trait::async_trait]
/// impl SessionClient for NullClient {
///     async fn get(&self, _key: &str) -> SessionResult<Option<Session>> {
///         Ok(None)
///     }
///     async fn set(&self, _key: &str, _session: &Session, _ttl: Duration) -> SessionResult<()> {
///         Ok(())
///     }
///     async fn destroy(&self, _key: &str) -> SessionResult<()> {
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait SessionClient: Send + Sync {
    /// Fetch the session stored under `key`.
    ///
    /// Returns `Ok(None)` when nothing is stored. Implementations may also
    /// return [`SessionError::NotFound`](crate::SessionError::NotFound), which
    /// callers treat the same way.
    async fn get(&self, key: &str) -> SessionResult<Option<Session>>;

    /// Store a session under `key` for `ttl`.
    async fn set(&self, key: &str, session: &Session, ttl: Duration) -> SessionResult<()>;

    /// Delete the session stored under `key`.
    async fn destroy(&self, key: &str) -> SessionResult<()>;

    /// Register an observer for connect/disconnect signals.
    ///
    /// Returns `false` if the client never reports availability changes.
    fn subscribe(&self, _observer: Arc<dyn StoreObserver>) -> bool {
        false
    }
}
