//! Session identifier generation.

use crate::lifecycle::RequestContext;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;

/// Default number of random bytes in a generated identifier.
pub const DEFAULT_ID_BYTES: usize = 24;

/// Produces identifiers for new sessions.
///
/// Uniqueness is the generator's responsibility; the middleware never checks
/// for collisions. The request context is available for generators that
/// derive part of the identifier from the request.
pub trait SessionIdGenerator: Send + Sync {
    /// Generate a new identifier.
    fn generate(&self, ctx: &RequestContext) -> String;
}

impl<F> SessionIdGenerator for F
where
    F: Fn(&RequestContext) -> String + Send + Sync,
{
    fn generate(&self, ctx: &RequestContext) -> String {
        self(ctx)
    }
}

/// URL-safe random identifiers (base64url without padding).
#[derive(Debug, Clone, Copy)]
pub struct UidGenerator {
    bytes: usize,
}

impl UidGenerator {
    /// Generator producing identifiers with `bytes` bytes of entropy.
    pub fn new(bytes: usize) -> Self {
        Self { bytes }
    }

    /// Generate an identifier without a request.
    pub fn generate_id(&self) -> String {
        let mut buf = vec![0u8; self.bytes];
        rand::thread_rng().fill_bytes(&mut buf);
        URL_SAFE_NO_PAD.encode(buf)
    }
}

impl Default for UidGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_ID_BYTES)
    }
}

impl SessionIdGenerator for UidGenerator {
    fn generate(&self, _ctx: &RequestContext) -> String {
        self.generate_id()
    }
}

/// Random v4 UUID identifiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl SessionIdGenerator for UuidGenerator {
    fn generate(&self, _ctx: &RequestContext) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}
