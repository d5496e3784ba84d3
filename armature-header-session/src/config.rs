//! Session middleware configuration.

use crate::client::SessionClient;
use crate::error::{DefaultErrorHandler, ErrorHandler};
use crate::id::{SessionIdGenerator, UidGenerator};
use crate::store::DEFAULT_PREFIX;
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default record TTL: one day.
pub const DEFAULT_TTL: Duration = Duration::from_millis(24 * 60 * 60 * 1000);

/// Default header carrying the session identifier.
pub const DEFAULT_HEADER: &str = "X-Session-ID";

/// Default allowed path prefix.
pub const DEFAULT_PATH: &str = "/";

/// Session middleware configuration.
///
/// A passive bag of options consumed by
/// [`SessionManager`](crate::lifecycle::SessionManager).
///
/// # Examples
///
/// ```
/// use armature_header_session::SessionConfig;
/// use std::time::Duration;
///
/// let config = SessionConfig::default()
///     .with_path("/api")
///     .with_header("X-Api-Session")
///     .with_ttl(Duration::from_secs(3600))
///     .with_defer(true);
///
/// assert_eq!(config.path, "/api");
/// assert!(config.defer);
/// ```
#[derive(Clone)]
pub struct SessionConfig {
    /// Backing client; `None` uses a fresh [`MemoryStore`](crate::memory::MemoryStore)
    pub store: Option<Arc<dyn SessionClient>>,
    /// Record time-to-live
    pub ttl: Duration,
    /// Key namespace applied by the store adapter
    pub prefix: String,
    /// Only requests whose path starts with this prefix get a session
    pub path: String,
    /// Header carrying the session identifier
    pub header: String,
    /// Load lazily on first access instead of before the handler
    pub defer: bool,
    /// Write the session back on every request, changed or not
    pub rolling: bool,
    /// Persist new sessions even when they are still empty
    pub allow_empty: bool,
    /// Identifier generator
    pub generator: Arc<dyn SessionIdGenerator>,
    /// Store error handler
    pub error_handler: Arc<dyn ErrorHandler>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            store: None,
            ttl: DEFAULT_TTL,
            prefix: DEFAULT_PREFIX.to_string(),
            path: DEFAULT_PATH.to_string(),
            header: DEFAULT_HEADER.to_string(),
            defer: false,
            rolling: false,
            allow_empty: false,
            generator: Arc::new(UidGenerator::default()),
            error_handler: Arc::new(DefaultErrorHandler),
        }
    }
}

impl SessionConfig {
    /// Create a configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a configuration from loaded options.
    pub fn from_options(options: SessionOptions) -> Self {
        Self {
            ttl: Duration::from_millis(options.ttl_ms),
            prefix: options.prefix,
            path: options.path,
            header: options.header,
            defer: options.defer,
            rolling: options.rolling,
            allow_empty: options.allow_empty,
            ..Default::default()
        }
    }

    /// Set the backing client.
    pub fn with_store(mut self, store: Arc<dyn SessionClient>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the record TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the key namespace.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Set the allowed path prefix.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Set the identifier header name.
    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = header.into();
        self
    }

    /// Enable or disable deferred loading.
    pub fn with_defer(mut self, defer: bool) -> Self {
        self.defer = defer;
        self
    }

    /// Enable or disable rolling sessions.
    pub fn with_rolling(mut self, rolling: bool) -> Self {
        self.rolling = rolling;
        self
    }

    /// Allow or skip persisting untouched new sessions.
    pub fn with_allow_empty(mut self, allow_empty: bool) -> Self {
        self.allow_empty = allow_empty;
        self
    }

    /// Set the identifier generator.
    pub fn with_generator(mut self, generator: impl SessionIdGenerator + 'static) -> Self {
        self.generator = Arc::new(generator);
        self
    }

    /// Set the store error handler.
    pub fn with_error_handler(mut self, handler: impl ErrorHandler + 'static) -> Self {
        self.error_handler = Arc::new(handler);
        self
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("custom_store", &self.store.is_some())
            .field("ttl", &self.ttl)
            .field("prefix", &self.prefix)
            .field("path", &self.path)
            .field("header", &self.header)
            .field("defer", &self.defer)
            .field("rolling", &self.rolling)
            .field("allow_empty", &self.allow_empty)
            .finish()
    }
}

/// Serializable subset of [`SessionConfig`].
///
/// Suitable for loading from an application config file; store, generator and
/// error handler are code-level concerns and stay on [`SessionConfig`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    /// Record time-to-live in milliseconds
    pub ttl_ms: u64,
    /// Key namespace
    pub prefix: String,
    /// Allowed path prefix
    pub path: String,
    /// Identifier header name
    pub header: String,
    /// Deferred loading
    pub defer: bool,
    /// Rolling sessions
    pub rolling: bool,
    /// Persist empty new sessions
    pub allow_empty: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            ttl_ms: DEFAULT_TTL.as_millis() as u64,
            prefix: DEFAULT_PREFIX.to_string(),
            path: DEFAULT_PATH.to_string(),
            header: DEFAULT_HEADER.to_string(),
            defer: false,
            rolling: false,
            allow_empty: false,
        }
    }
}

impl SessionOptions {
    /// Read options from `ARMATURE_SESSION_*` environment variables.
    ///
    /// - `ARMATURE_SESSION_TTL_MS`
    /// - `ARMATURE_SESSION_PREFIX`
    /// - `ARMATURE_SESSION_PATH`
    /// - `ARMATURE_SESSION_HEADER`
    /// - `ARMATURE_SESSION_DEFER`
    /// - `ARMATURE_SESSION_ROLLING`
    /// - `ARMATURE_SESSION_ALLOW_EMPTY`
    ///
    /// Unset or unparsable variables keep their defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read options through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let flag = |key: &str, default: bool| {
            lookup(key)
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(default)
        };

        Self {
            ttl_ms: lookup("ARMATURE_SESSION_TTL_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.ttl_ms),
            prefix: lookup("ARMATURE_SESSION_PREFIX").unwrap_or(defaults.prefix),
            path: lookup("ARMATURE_SESSION_PATH").unwrap_or(defaults.path),
            header: lookup("ARMATURE_SESSION_HEADER").unwrap_or(defaults.header),
            defer: flag("ARMATURE_SESSION_DEFER", defaults.defer),
            rolling: flag("ARMATURE_SESSION_ROLLING", defaults.rolling),
            allow_empty: flag("ARMATURE_SESSION_ALLOW_EMPTY", defaults.allow_empty),
        }
    }
}
