//! Cooperative abort signal.

use std::sync::atomic::{AtomicBool, Ordering};

/// Signal for aborting a workflow run.
///
/// Cancellation is cooperative: the executor checks the flag at step and
/// attempt boundaries, an in-flight runner call is never interrupted.
pub struct AbortSignal {
    aborted: AtomicBool,
}

impl AbortSignal {
    /// Create a new abort signal.
    pub fn new() -> Self {
        Self {
            aborted: AtomicBool::new(false),
        }
    }

    /// Check if aborted.
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Relaxed)
    }

    /// Trigger the abort.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Relaxed);
    }
}

impl Default for AbortSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_abort_signal_new() {
        let signal = AbortSignal::new();
        assert!(!signal.is_aborted());
    }

    #[test]
    fn test_abort_signal_abort() {
        let signal = AbortSignal::new();
        signal.abort();
        assert!(signal.is_aborted());
    }

    #[test]
    fn test_abort_signal_idempotent() {
        let signal = AbortSignal::new();
        signal.abort();
        signal.abort();
        assert!(signal.is_aborted());
    }

    #[test]
    fn test_abort_signal_shared() {
        let signal = Arc::new(AbortSignal::new());
        let handle = signal.clone();
        handle.abort();
        assert!(signal.is_aborted());
    }
}
