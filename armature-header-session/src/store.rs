//! Store adapter between the session lifecycle and a backing client.

use crate::client::{SessionClient, StoreEvent, StoreObserver};
use crate::error::SessionResult;
use crate::session::Session;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Default key namespace.
pub const DEFAULT_PREFIX: &str = "sess:";

type Observers = Arc<RwLock<Vec<Arc<dyn StoreObserver>>>>;

/// Namespacing wrapper around a [`SessionClient`].
///
/// Every key is prefixed here and nowhere else. Availability signals from the
/// client are re-emitted unchanged to observers registered on the adapter.
///
/// Cheap to clone; clones share the client and observer list. A clone is
/// attached to each request for introspection.
///
/// # Examples
///
/// ```
/// use armature_header_session::{MemoryStore, Session, SessionStore};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), armature_header_session::SessionError> {
/// let store = SessionStore::new(Arc::new(MemoryStore::new()), "app:", Duration::from_secs(60));
///
/// let mut session = Session::new();
/// session.set("user_id", 42)?;
/// store.persist("abc", &session).await?;
///
/// assert_eq!(store.load("abc").await?, Some(session));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct SessionStore {
    client: Arc<dyn SessionClient>,
    prefix: String,
    ttl: Duration,
    observers: Observers,
}

/// Forwards client events to the adapter's observers.
struct Relay {
    observers: Observers,
}

impl StoreObserver for Relay {
    fn notify(&self, event: StoreEvent) {
        trace!(?event, "Relaying store availability event");
        for observer in self.observers.read().iter() {
            observer.notify(event);
        }
    }
}

impl SessionStore {
    /// Wrap a client with the given key prefix and record TTL.
    pub fn new(client: Arc<dyn SessionClient>, prefix: impl Into<String>, ttl: Duration) -> Self {
        let observers: Observers = Arc::new(RwLock::new(Vec::new()));
        let relayed = client.subscribe(Arc::new(Relay {
            observers: Arc::clone(&observers),
        }));
        let prefix = prefix.into();
        debug!(prefix = %prefix, ?ttl, relayed, "Created session store adapter");

        Self {
            client,
            prefix,
            ttl,
            observers,
        }
    }

    /// Register an observer for availability changes of the client.
    pub fn subscribe(&self, observer: Arc<dyn StoreObserver>) {
        self.observers.write().push(observer);
    }

    /// Key namespace.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// TTL handed to the client on every write.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Namespaced key for a session identifier.
    pub fn key_for(&self, session_id: &str) -> String {
        format!("{}{}", self.prefix, session_id)
    }

    /// Underlying client.
    pub fn client(&self) -> &Arc<dyn SessionClient> {
        &self.client
    }

    /// Load the session stored for `session_id`.
    ///
    /// A missing record is `Ok(None)`; client errors are returned unchanged.
    pub async fn load(&self, session_id: &str) -> SessionResult<Option<Session>> {
        let key = self.key_for(session_id);
        trace!(key = %key, "GET");

        match self.client.get(&key).await? {
            Some(session) => {
                trace!(key = %key, entries = session.len(), "GOT");
                Ok(Some(session))
            }
            None => {
                trace!(key = %key, "GET empty");
                Ok(None)
            }
        }
    }

    /// Store `session` for `session_id` with the configured TTL.
    pub async fn persist(&self, session_id: &str, session: &Session) -> SessionResult<()> {
        let key = self.key_for(session_id);
        trace!(key = %key, ttl = ?self.ttl, "SET");
        self.client.set(&key, session, self.ttl).await?;
        trace!(key = %key, "SET complete");
        Ok(())
    }

    /// Delete the session stored for `session_id`.
    pub async fn remove(&self, session_id: &str) -> SessionResult<()> {
        let key = self.key_for(session_id);
        trace!(key = %key, "DEL");
        self.client.destroy(&key).await?;
        trace!(key = %key, "DEL complete");
        Ok(())
    }
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("prefix", &self.prefix)
            .field("ttl", &self.ttl)
            .field("observers", &self.observers.read().len())
            .finish()
    }
}
