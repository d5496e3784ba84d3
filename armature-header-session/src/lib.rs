//! Header-based session middleware for Armature.
//!
//! Sessions are identified by an HTTP header (`X-Session-ID` by default)
//! instead of a cookie, which suits API clients and native apps that manage
//! their own tokens. The middleware loads the session from a pluggable store
//! before the handler runs and writes it back afterwards, but only when the
//! content actually changed.
//!
//! # Lifecycle
//!
//! 1. The request path is checked against the configured prefix.
//! 2. The identifier comes from an upstream [`SessionId`] extension or the
//!    header; requests without one, or whose identifier is unknown to the
//!    store, get a fresh identifier and an empty session.
//! 3. The handler reads and mutates the session through a [`SessionHandle`].
//! 4. After the handler returns, the session is removed (cleared by the
//!    handler), persisted (content hash changed, or `rolling`), or left alone.
//!    New sessions that are still empty are not written unless `allow_empty`
//!    is set.
//!
//! With `defer` enabled the load only happens when the handler first reads
//! the session, so routes that never look at it cost no store round-trips.
//!
//! # Stores
//!
//! Any key-value backend implementing [`SessionClient`] can be plugged in.
//! [`MemoryStore`] is included for tests and development; it keeps everything
//! in-process and should not be used in production.
//!
//! # Examples
//!
//! ```no_run
//! use armature_header_session::prelude::*;
//! use http::{Request, Response};
//! use std::convert::Infallible;
//! use tower::{Layer, ServiceExt, service_fn};
//!
//! async fn counter(req: Request<()>) -> Result<Response<String>, Infallible> {
//!     let Some(handle) = req.extensions().get::<SessionHandle>().cloned() else {
//!         return Ok(Response::new("no session".to_string()));
//!     };
//!     let count = handle
//!         .update(|session| {
//!             let count = session.get::<u64>("count").unwrap_or(0) + 1;
//!             let _ = session.set("count", count);
//!             count
//!         })
//!         .await
//!         .ok()
//!         .flatten()
//!         .unwrap_or(0);
//!     Ok(Response::new(count.to_string()))
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), SessionError> {
//!     let layer = SessionLayer::new(SessionConfig::default().with_path("/session"))?;
//!
//!     let response = layer
//!         .layer(service_fn(counter))
//!         .oneshot(Request::get("/session/count").body(()).unwrap())
//!         .await
//!         .unwrap();
//!
//!     println!("session id: {:?}", response.headers().get("x-session-id"));
//!     Ok(())
//! }
//! ```

pub mod availability;
pub mod client;
pub mod config;
pub mod error;
pub mod handle;
pub mod id;
pub mod lifecycle;
pub mod memory;
pub mod middleware;
pub mod session;
pub mod store;

pub use availability::Availability;
pub use client::{SessionClient, StoreEvent, StoreObserver};
pub use config::{SessionConfig, SessionOptions};
pub use error::{DefaultErrorHandler, ErrorHandler, Operation, SessionError, SessionResult};
pub use handle::{SessionHandle, SessionId};
pub use id::{SessionIdGenerator, UidGenerator, UuidGenerator};
pub use lifecycle::{Acquired, ReleaseOutcome, RequestContext, SessionManager};
pub use memory::MemoryStore;
pub use middleware::{SessionLayer, SessionService};
pub use session::{ContentHash, Session};
pub use store::SessionStore;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::client::{SessionClient, StoreEvent, StoreObserver};
    pub use crate::config::{SessionConfig, SessionOptions};
    pub use crate::error::{ErrorHandler, Operation, SessionError, SessionResult};
    pub use crate::handle::{SessionHandle, SessionId};
    pub use crate::lifecycle::{RequestContext, SessionManager};
    pub use crate::memory::MemoryStore;
    pub use crate::middleware::SessionLayer;
    pub use crate::session::Session;
    pub use crate::store::SessionStore;
}
