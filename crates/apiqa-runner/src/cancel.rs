//! Cooperative cancellation threaded through every blocking point.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Cancellation handle shared by the suite runner, HTTP invoker, and hook
/// runner. Cancellation is cooperative: each blocking point consults the
/// token, and per-call timeouts compose with the token's deadline as
/// first-to-fire.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that fires after `timeout`, in addition to explicit `cancel()`.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: Some(Instant::now() + timeout),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        if self.flag.load(Ordering::SeqCst) {
            return true;
        }
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Time left until the deadline, if one is set. `None` means unbounded.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Clamp a per-call timeout to whatever the token still allows.
    #[must_use]
    pub fn clamp(&self, timeout: Duration) -> Duration {
        match self.remaining() {
            Some(rem) => timeout.min(rem),
            None => timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_is_live() {
        let t = CancelToken::new();
        assert!(!t.is_cancelled());
        assert_eq!(t.remaining(), None);
        assert_eq!(t.clamp(Duration::from_secs(5)), Duration::from_secs(5));
    }

    #[test]
    fn explicit_cancel_propagates_to_clones() {
        let t = CancelToken::new();
        let c = t.clone();
        t.cancel();
        assert!(c.is_cancelled());
    }

    #[test]
    fn deadline_clamps_call_timeout() {
        let t = CancelToken::with_timeout(Duration::from_millis(50));
        assert!(t.clamp(Duration::from_secs(10)) <= Duration::from_millis(50));
    }

    #[test]
    fn expired_deadline_reads_as_cancelled() {
        let t = CancelToken::with_timeout(Duration::ZERO);
        assert!(t.is_cancelled());
        assert_eq!(t.remaining(), Some(Duration::ZERO));
    }
}
