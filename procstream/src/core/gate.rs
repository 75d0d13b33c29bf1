//! One-way cancellation flag shared between a caller and a pump thread.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Latching cancellation flag. Once set it never clears.
///
/// Clones share the same flag, so a handle given to a callback observes and
/// triggers the same cancellation as the owning pump.
#[derive(Debug, Clone, Default)]
pub struct CancellationGate {
    cancelled: Arc<AtomicBool>,
}

impl CancellationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag. Returns `true` if this call performed the transition.
    pub fn cancel(&self) -> bool {
        !self.cancelled.swap(true, Ordering::AcqRel)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}
