use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{AnalysisError, Result};

/// How often a long-running loop polls its [`CancellationToken`].
///
/// Chosen so cancellation latency stays sub-100ms at realistic
/// parsing/building throughput without making every iteration pay for
/// an atomic load.
pub const CANCEL_POLL_INTERVAL: usize = 4096;

/// A cooperative cancellation signal shared between a caller and the
/// parser/builder it invoked.
///
/// Cloning shares the underlying flag; `cancel()` on any clone is
/// visible to all others.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    canceled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::SeqCst);
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    /// Returns `Err(AnalysisError::Canceled)` if the token has fired.
    /// Call this at most once per [`CANCEL_POLL_INTERVAL`] iterations
    /// of a hot loop.
    pub fn check(&self) -> Result<()> {
        if self.is_canceled() {
            Err(AnalysisError::Canceled)
        } else {
            Ok(())
        }
    }

    /// Convenience for hot loops: only checks every `CANCEL_POLL_INTERVAL`th
    /// call, indexed by `i`.
    pub fn check_every(&self, i: usize) -> Result<()> {
        if i % CANCEL_POLL_INTERVAL == 0 {
            self.check()
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fresh_token_not_canceled() {
        let token = CancellationToken::new();
        assert!(token.check().is_ok());
    }

    #[test]
    fn cancel_is_visible_across_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_canceled());
        assert!(matches!(token.check(), Err(AnalysisError::Canceled)));
    }

    #[test]
    fn check_every_only_polls_at_interval() {
        let token = CancellationToken::new();
        token.cancel();
        // Not a multiple of the interval -- check_every skips the check.
        assert!(token.check_every(1).is_ok());
        assert!(token.check_every(CANCEL_POLL_INTERVAL).is_err());
    }
}
