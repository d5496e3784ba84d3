//! Store availability tracking.

use crate::client::{StoreEvent, StoreObserver};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// Last known availability of the backing store.
///
/// Flipped only by [`StoreEvent`]s and read before every load. Reads are not
/// synchronised with the events: a disconnect arriving mid-request may let
/// that request reach the store once more.
#[derive(Debug, Clone)]
pub struct Availability {
    available: Arc<AtomicBool>,
}

impl Availability {
    /// Create a tracker that starts out available.
    pub fn new() -> Self {
        Self {
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Whether the store was last reported connected.
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    /// Apply an availability signal.
    pub fn apply(&self, event: StoreEvent) {
        let available = matches!(event, StoreEvent::Connect);
        let previous = self.available.swap(available, Ordering::AcqRel);
        if previous != available {
            if available {
                debug!("Session store reconnected");
            } else {
                warn!("Session store disconnected, failing session loads fast");
            }
        }
    }
}

impl Default for Availability {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreObserver for Availability {
    fn notify(&self, event: StoreEvent) {
        self.apply(event);
    }
}
