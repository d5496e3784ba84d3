//! Request-scoped access to the session.
//!
//! The middleware inserts a [`SessionHandle`] into the request extensions. In
//! eager mode it arrives already loaded; in deferred mode it is a lazy cell
//! that loads on the first [`read`](SessionHandle::read) and not at all if the
//! handler never asks.

use crate::error::SessionResult;
use crate::lifecycle::{Acquired, RequestContext, SessionManager};
use crate::session::{ContentHash, Session};
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::trace;

/// Session identifier as a request extension.
///
/// Insert one before the session layer runs to override header-based
/// resolution. In eager mode the layer replaces it with the resolved
/// identifier before calling the handler.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(pub String);

impl SessionId {
    /// Identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lazily loads the session on first read.
struct Loader {
    manager: Arc<SessionManager>,
    ctx: RequestContext,
}

#[derive(Default)]
struct HandleState {
    loader: Option<Loader>,
    loaded: bool,
    touched: bool,
    session: Option<Session>,
    session_id: Option<String>,
    original_hash: Option<ContentHash>,
    is_new: bool,
}

impl HandleState {
    async fn ensure_loaded(&mut self) -> SessionResult<()> {
        if self.loaded || self.touched {
            return Ok(());
        }
        let Some(loader) = self.loader.as_ref() else {
            return Ok(());
        };

        trace!("Deferred session accessed, loading");
        let acquired = loader.manager.acquire(&loader.ctx).await?;
        self.loaded = true;
        if let Some(acquired) = acquired {
            self.apply(acquired);
        }
        Ok(())
    }

    fn apply(&mut self, acquired: Acquired) {
        self.touched = true;
        self.session = Some(acquired.session);
        self.session_id = Some(acquired.session_id);
        self.original_hash = acquired.original_hash;
        self.is_new = acquired.is_new;
    }
}

/// State handed back to the lifecycle once the handler is done.
#[derive(Debug, Clone)]
pub(crate) struct Pending {
    /// `None` when the handler wrote without reading
    pub session_id: Option<String>,
    pub session: Option<Session>,
    pub original_hash: Option<ContentHash>,
    pub is_new: bool,
}

/// Handle to the current request's session.
///
/// Clones share the same state. Reads return a copy of the session; changes
/// go through [`write`](Self::write), [`update`](Self::update) or
/// [`clear`](Self::clear).
///
/// # Examples
///
/// ```ignore
/// async fn counter(req: Request<()>) -> Result<Response<String>, Infallible> {
///     let handle = req.extensions().get::<SessionHandle>().cloned().unwrap();
///     let count = handle
///         .update(|session| {
///             let count = session.get::<u64>("count").unwrap_or(0) + 1;
///             let _ = session.set("count", count);
///             count
///         })
///         .await?;
///     Ok(Response::new(count.unwrap_or(0).to_string()))
/// }
/// ```
#[derive(Clone)]
pub struct SessionHandle {
    state: Arc<Mutex<HandleState>>,
}

impl SessionHandle {
    /// Handle around a session that is already loaded.
    pub fn loaded(acquired: Acquired) -> Self {
        let mut state = HandleState {
            loaded: true,
            ..Default::default()
        };
        state.apply(acquired);
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Handle that loads through `manager` on first read.
    pub fn deferred(manager: Arc<SessionManager>, ctx: RequestContext) -> Self {
        Self {
            state: Arc::new(Mutex::new(HandleState {
                loader: Some(Loader { manager, ctx }),
                ..Default::default()
            })),
        }
    }

    /// Current session, loading it first if needed.
    ///
    /// Loads at most once per request. `None` means the session was cleared.
    pub async fn read(&self) -> SessionResult<Option<Session>> {
        let mut state = self.state.lock().await;
        state.ensure_loaded().await?;
        Ok(state.session.clone())
    }

    /// Replace the session without loading it.
    ///
    /// `None` requests removal of the stored session.
    pub async fn write(&self, session: Option<Session>) {
        let mut state = self.state.lock().await;
        state.touched = true;
        state.session = session;
    }

    /// Mutate the session in place, loading it first if needed.
    ///
    /// Returns `None` without calling `f` if the session was cleared.
    pub async fn update<F, R>(&self, f: F) -> SessionResult<Option<R>>
    where
        F: FnOnce(&mut Session) -> R,
    {
        let mut state = self.state.lock().await;
        state.ensure_loaded().await?;
        state.touched = true;
        Ok(state.session.as_mut().map(f))
    }

    /// Request removal of the session.
    pub async fn clear(&self) {
        self.write(None).await;
    }

    /// Identifier of the loaded session.
    ///
    /// `None` until the session is loaded; a write without a prior read
    /// leaves it unresolved until the response is written.
    pub async fn id(&self) -> Option<String> {
        self.state.lock().await.session_id.clone()
    }

    /// Whether the handler read or wrote the session.
    pub async fn is_touched(&self) -> bool {
        self.state.lock().await.touched
    }

    /// Final state, or `None` if the session was never touched.
    pub(crate) async fn pending(&self) -> Option<Pending> {
        let state = self.state.lock().await;
        if !state.touched {
            return None;
        }
        Some(Pending {
            session_id: state.session_id.clone(),
            session: state.session.clone(),
            original_hash: state.original_hash,
            is_new: state.is_new,
        })
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle").finish_non_exhaustive()
    }
}
