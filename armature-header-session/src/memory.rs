//! In-memory session client.
//!
//! Uses DashMap for thread-safe concurrent access. Records never leave the
//! process and are only evicted lazily, so this store is meant for tests,
//! development and single-instance tools. Use a shared store in production.

use crate::client::{SessionClient, StoreEvent, StoreObserver};
use crate::error::SessionResult;
use crate::session::Session;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::{Arc, Once};
use std::time::Duration;
use tracing::{debug, trace, warn};

const PRODUCTION_WARNING: &str = "header session MemoryStore is not designed for a production \
environment, as it will leak memory, and will not scale past a single process.";

static WARN_ONCE: Once = Once::new();

#[derive(Debug, Clone)]
struct StoredRecord {
    json: String,
    expires_at: Option<DateTime<Utc>>,
}

impl StoredRecord {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// In-memory backing client.
///
/// Sessions are stored serialized, exactly as a remote key-value store would
/// hold them. [`MemoryStore::emit`] lets tests and embedders simulate
/// connect/disconnect signals.
pub struct MemoryStore {
    sessions: DashMap<String, StoredRecord>,
    observers: RwLock<Vec<Arc<dyn StoreObserver>>>,
}

impl MemoryStore {
    /// Create a new in-memory store.
    pub fn new() -> Self {
        WARN_ONCE.call_once(|| warn!("{}", PRODUCTION_WARNING));
        debug!("Creating new in-memory session store");
        Self {
            sessions: DashMap::new(),
            observers: RwLock::new(Vec::new()),
        }
    }

    /// Notify subscribers of an availability change.
    pub fn emit(&self, event: StoreEvent) {
        debug!(?event, "Memory store emitting availability event");
        for observer in self.observers.read().iter() {
            observer.notify(event);
        }
    }

    /// Number of stored records, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no records are stored.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Remove every record.
    pub fn clear(&self) {
        self.sessions.clear();
    }

    /// Evict expired records, returning how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, record| !record.is_expired(now));
        let purged = before.saturating_sub(self.sessions.len());
        if purged > 0 {
            debug!(purged, "Purged expired sessions");
        }
        purged
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SessionClient for MemoryStore {
    async fn get(&self, key: &str) -> SessionResult<Option<Session>> {
        let now = Utc::now();
        let json = match self.sessions.get(key) {
            Some(record) if !record.is_expired(now) => Some(record.json.clone()),
            Some(_) => None,
            None => {
                trace!(key = %key, "Memory store miss");
                return Ok(None);
            }
        };

        match json {
            Some(json) => {
                trace!(key = %key, value = %json, "Memory store hit");
                Session::from_json(&json).map(Some)
            }
            None => {
                trace!(key = %key, "Memory store record expired");
                self.sessions.remove(key);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, session: &Session, ttl: Duration) -> SessionResult<()> {
        let json = session.to_json()?;
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_add_signed(ttl));
        trace!(key = %key, value = %json, "Memory store set");
        self.sessions
            .insert(key.to_string(), StoredRecord { json, expires_at });
        Ok(())
    }

    async fn destroy(&self, key: &str) -> SessionResult<()> {
        trace!(key = %key, "Memory store destroy");
        self.sessions.remove(key);
        Ok(())
    }

    fn subscribe(&self, observer: Arc<dyn StoreObserver>) -> bool {
        self.observers.write().push(observer);
        true
    }
}
