//! Cooperative cancellation for long-running store operations (§5): edge
//! derivation, validation, and restore check a token between pairs/records
//! and abort cleanly rather than running to completion once a caller gives
//! up (a CLI `Ctrl-C`, a collaborator request timing out).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{FloopError, Result};

/// A cheap, cloneable flag a caller can cancel from another thread or after
/// a deadline elapses. Checking it is a relaxed atomic load; it carries no
/// async runtime dependency since the engine's own operations are
/// synchronous.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    /// Returns `Err(FloopError::Cancelled)` if this token has been
    /// cancelled, otherwise `Ok(())`. Call between units of work in a loop
    /// over pairs/records.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(FloopError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_is_not_cancelled() {
        let token = CancellationToken::new();
        assert!(token.check().is_ok());
    }

    #[test]
    fn cancelling_is_visible_through_a_clone() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(FloopError::Cancelled)));
    }
}
