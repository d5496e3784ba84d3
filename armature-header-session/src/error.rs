//! Error types for session operations.

use crate::lifecycle::RequestContext;
use std::fmt;
use thiserror::Error;

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// Store operation an error was raised from.
///
/// Removal is reported as [`Operation::Set`]: from the request's point of
/// view both are "write the session back".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Loading a session
    Get,
    /// Persisting or removing a session
    Set,
}

impl Operation {
    /// Get the operation name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Get => "get",
            Operation::Set => "set",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session-specific errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The backing store signalled a disconnect
    #[error("session store error: store is unavailable")]
    StoreUnavailable,

    /// Record missing in the backing store
    #[error("Session not found: {0}")]
    NotFound(String),

    /// Error raised by a backing client
    #[error("Backend error: {0}")]
    Backend(String),

    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid session ID
    #[error("Invalid session ID: {0}")]
    InvalidSessionId(String),

    /// Operation timeout
    #[error("Operation timeout")]
    Timeout,

    /// Error annotated by the default error handler
    #[error("header session {op} error: {source}")]
    Operation {
        /// Operation that failed
        op: Operation,
        /// Underlying store error
        #[source]
        source: Box<SessionError>,
    },

    /// Generic error
    #[error("Session error: {0}")]
    Other(String),
}

impl SessionError {
    /// Whether this error means "no such record" rather than a store failure.
    ///
    /// Not-found errors on load are treated exactly like a cache miss.
    pub fn is_not_found(&self) -> bool {
        match self {
            SessionError::NotFound(_) => true,
            SessionError::Operation { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    /// The operation this error was annotated with, if any.
    pub fn operation(&self) -> Option<Operation> {
        match self {
            SessionError::Operation { op, .. } => Some(*op),
            _ => None,
        }
    }
}

/// Handler invoked for store errors raised while loading or writing a session.
///
/// Returning `Err` fails the request. Returning `Ok(())` swallows the error:
/// a failed load continues with a fresh session, a failed write is reported
/// as [`ReleaseOutcome::Recovered`](crate::lifecycle::ReleaseOutcome::Recovered).
pub trait ErrorHandler: Send + Sync {
    /// Handle a store error for the given operation.
    fn handle(&self, error: SessionError, op: Operation, ctx: &RequestContext)
    -> SessionResult<()>;
}

impl<F> ErrorHandler for F
where
    F: Fn(SessionError, Operation, &RequestContext) -> SessionResult<()> + Send + Sync,
{
    fn handle(
        &self,
        error: SessionError,
        op: Operation,
        ctx: &RequestContext,
    ) -> SessionResult<()> {
        self(error, op, ctx)
    }
}

/// Annotates the error with the failing operation and re-raises it.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultErrorHandler;

impl ErrorHandler for DefaultErrorHandler {
    fn handle(
        &self,
        error: SessionError,
        op: Operation,
        _ctx: &RequestContext,
    ) -> SessionResult<()> {
        Err(SessionError::Operation {
            op,
            source: Box::new(error),
        })
    }
}
