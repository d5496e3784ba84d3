//! Per-request session lifecycle.
//!
//! [`SessionManager::acquire`] resolves the identifier and loads (or creates)
//! the session before the handler sees it; [`SessionManager::release`]
//! decides afterwards whether the store needs to hear about it. Both the eager
//! and the deferred middleware variants drive these two calls.

use crate::availability::Availability;
use crate::config::SessionConfig;
use crate::error::{ErrorHandler, Operation, SessionError, SessionResult};
use crate::handle::SessionId;
use crate::id::SessionIdGenerator;
use crate::memory::MemoryStore;
use crate::session::{ContentHash, Session};
use crate::store::SessionStore;
use http::{HeaderMap, HeaderName, HeaderValue, Method, Request, Uri};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Request data the lifecycle needs, detached from the request body.
///
/// Passed to identifier generators and error handlers.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Request method
    pub method: Method,
    /// Request URI
    pub uri: Uri,
    /// Request headers
    pub headers: HeaderMap,
    /// Identifier established earlier in the pipeline, if any
    pub session_id: Option<String>,
}

impl RequestContext {
    /// Context for a request without headers.
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            session_id: None,
        }
    }

    /// Capture the context of an `http` request.
    ///
    /// A [`SessionId`] extension inserted by an upstream layer is picked up as
    /// the pre-established identifier.
    pub fn from_request<B>(req: &Request<B>) -> Self {
        Self {
            method: req.method().clone(),
            uri: req.uri().clone(),
            headers: req.headers().clone(),
            session_id: req
                .extensions()
                .get::<SessionId>()
                .map(|id| id.as_str().to_string()),
        }
    }

    /// Add a header. Invalid names or values are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::try_from(name),
            HeaderValue::try_from(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Set the pre-established identifier.
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Request path.
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Header value as a string, if present and valid.
    pub fn header(&self, name: &HeaderName) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Session resolved for a request.
#[derive(Debug, Clone, PartialEq)]
pub struct Acquired {
    /// Identifier the session lives under
    pub session_id: String,
    /// Loaded or freshly created session
    pub session: Session,
    /// Content hash at load time; `None` for new sessions
    pub original_hash: Option<ContentHash>,
    /// Whether the session was created for this request
    pub is_new: bool,
}

/// What [`SessionManager::release`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// Nothing written: unchanged, new and empty, or new and cleared
    Unchanged,
    /// Session written to the store
    Persisted,
    /// Session removed from the store
    Removed,
    /// Store write failed and the error handler chose to continue
    Recovered,
}

/// Session lifecycle controller.
///
/// One manager serves every request of a middleware instance. The only state
/// shared between requests is the store and its [`Availability`].
///
/// # Examples
///
/// ```
/// use armature_header_session::{RequestContext, SessionConfig, SessionManager};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), armature_header_session::SessionError> {
/// let manager = SessionManager::new(SessionConfig::default())?;
/// let ctx = RequestContext::new(http::Method::GET, "/".parse().unwrap());
///
/// let mut acquired = manager.acquire(&ctx).await?.expect("path matches");
/// assert!(acquired.is_new);
///
/// acquired.session.set("count", 1)?;
/// manager
///     .release(&ctx, &acquired.session_id, Some(&acquired.session), None, true)
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct SessionManager {
    store: SessionStore,
    availability: Availability,
    header: HeaderName,
    path: String,
    defer: bool,
    rolling: bool,
    allow_empty: bool,
    generator: Arc<dyn SessionIdGenerator>,
    error_handler: Arc<dyn ErrorHandler>,
    empty_hash: ContentHash,
}

impl SessionManager {
    /// Build a manager from configuration.
    ///
    /// Falls back to a new [`MemoryStore`] when no store is configured.
    pub fn new(config: SessionConfig) -> SessionResult<Self> {
        let header = HeaderName::try_from(config.header.as_str()).map_err(|e| {
            SessionError::Config(format!("invalid header name '{}': {}", config.header, e))
        })?;

        if !config.path.starts_with('/') {
            return Err(SessionError::Config(format!(
                "session path must start with '/', got '{}'",
                config.path
            )));
        }

        let client = config
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let store = SessionStore::new(client, config.prefix, config.ttl);

        let availability = Availability::new();
        store.subscribe(Arc::new(availability.clone()));

        debug!(
            header = %header,
            path = %config.path,
            defer = config.defer,
            rolling = config.rolling,
            allow_empty = config.allow_empty,
            "Session manager configured"
        );

        Ok(Self {
            store,
            availability,
            header,
            path: config.path,
            defer: config.defer,
            rolling: config.rolling,
            allow_empty: config.allow_empty,
            generator: config.generator,
            error_handler: config.error_handler,
            empty_hash: Session::new().content_hash(),
        })
    }

    /// Store adapter.
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Store availability tracker.
    pub fn availability(&self) -> &Availability {
        &self.availability
    }

    /// Header carrying the identifier.
    pub fn header(&self) -> &HeaderName {
        &self.header
    }

    /// Whether sessions are loaded lazily.
    pub fn is_deferred(&self) -> bool {
        self.defer
    }

    /// Whether a request path is inside the allowed prefix.
    pub fn matches_path(&self, path: &str) -> bool {
        path.starts_with(&self.path)
    }

    /// Identifier the client presented, preferring one set upstream.
    fn incoming_id(&self, ctx: &RequestContext) -> Option<String> {
        ctx.session_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .or_else(|| ctx.header(&self.header).filter(|id| !id.is_empty()))
            .map(str::to_string)
    }

    fn fresh(&self, ctx: &RequestContext) -> Acquired {
        let session_id = self.generator.generate(ctx);
        trace!(session_id = %session_id, "Generated new session id");
        Acquired {
            session_id,
            session: Session::new(),
            original_hash: None,
            is_new: true,
        }
    }

    /// Resolve the identifier and load or create the session.
    ///
    /// Returns `Ok(None)` when the request path is outside the allowed
    /// prefix. Fails with [`SessionError::StoreUnavailable`] before touching
    /// the store if it was last reported disconnected.
    pub async fn acquire(&self, ctx: &RequestContext) -> SessionResult<Option<Acquired>> {
        if !self.availability.is_available() {
            debug!("Session store is disconnected");
            return Err(SessionError::StoreUnavailable);
        }

        if !self.matches_path(ctx.path()) {
            debug!(path = %ctx.path(), "Session path not matched");
            return Ok(None);
        }

        let Some(session_id) = self.incoming_id(ctx) else {
            debug!("Session id not present, generating a new one");
            return Ok(Some(self.fresh(ctx)));
        };

        let loaded = match self.store.load(&session_id).await {
            Ok(found) => found,
            Err(err) if err.is_not_found() => {
                debug!(session_id = %session_id, "Session lookup reported not found");
                None
            }
            Err(err) => {
                warn!(session_id = %session_id, error = %err, "Failed to load session");
                self.error_handler.handle(err, Operation::Get, ctx)?;
                None
            }
        };

        match loaded {
            Some(session) => {
                debug!(session_id = %session_id, entries = session.len(), "Loaded session");
                let original_hash = Some(session.content_hash());
                Ok(Some(Acquired {
                    session_id,
                    session,
                    original_hash,
                    is_new: false,
                }))
            }
            None => {
                debug!(
                    session_id = %session_id,
                    "No stored session for id, generating a new one"
                );
                Ok(Some(self.fresh(ctx)))
            }
        }
    }

    /// Identifier for a session written without ever being read.
    ///
    /// Returns the presented identifier (not new) or a generated one (new).
    pub fn resolve_for_write(&self, ctx: &RequestContext) -> (String, bool) {
        match self.incoming_id(ctx) {
            Some(session_id) => (session_id, false),
            None => (self.generator.generate(ctx), true),
        }
    }

    /// Persist, remove or skip the session after the handler finished.
    ///
    /// `session` is the handler's final value; `None` asks for removal.
    pub async fn release(
        &self,
        ctx: &RequestContext,
        session_id: &str,
        session: Option<&Session>,
        original_hash: Option<ContentHash>,
        is_new: bool,
    ) -> SessionResult<ReleaseOutcome> {
        let Some(session) = session else {
            if is_new {
                debug!(session_id = %session_id, "New session cleared, nothing to destroy");
                return Ok(ReleaseOutcome::Unchanged);
            }

            debug!(session_id = %session_id, "Session cleared, destroying");
            return match self.store.remove(session_id).await {
                Ok(()) => Ok(ReleaseOutcome::Removed),
                Err(err) => self.recover_write(err, session_id, ctx),
            };
        };

        let new_hash = session.content_hash();
        if !self.allow_empty && is_new && new_hash == self.empty_hash {
            debug!(session_id = %session_id, "New session not modified");
            return Ok(ReleaseOutcome::Unchanged);
        }

        if !self.rolling && original_hash == Some(new_hash) {
            debug!(session_id = %session_id, "Session not modified");
            return Ok(ReleaseOutcome::Unchanged);
        }

        match self.store.persist(session_id, session).await {
            Ok(()) => {
                debug!(session_id = %session_id, "Session saved");
                Ok(ReleaseOutcome::Persisted)
            }
            Err(err) => self.recover_write(err, session_id, ctx),
        }
    }

    fn recover_write(
        &self,
        err: SessionError,
        session_id: &str,
        ctx: &RequestContext,
    ) -> SessionResult<ReleaseOutcome> {
        warn!(session_id = %session_id, error = %err, "Failed to write session");
        self.error_handler.handle(err, Operation::Set, ctx)?;
        Ok(ReleaseOutcome::Recovered)
    }
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("store", &self.store)
            .field("available", &self.availability.is_available())
            .field("header", &self.header)
            .field("path", &self.path)
            .field("defer", &self.defer)
            .field("rolling", &self.rolling)
            .field("allow_empty", &self.allow_empty)
            .finish()
    }
}
