//! # Cooperative cancellation
//!
//! Control loops poll a `CancelToken` once per iteration. A token carries two
//! flags:
//!
//! - `stop`, requested by code (e.g. a state deciding the experiment is over)
//! - `interrupt`, requested asynchronously by the operator via Ctrl-C
//!
//! Tokens are cheap to clone and every clone shares the same flags. Separate
//! loops in one process can use separate tokens.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use log::warn;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Shared stop and interrupt flags for a control loop.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    stop: Arc<AtomicBool>,
    interrupt: Arc<AtomicBool>,
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that the loop stops at the start of its next iteration.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Flag that the operator interrupted execution.
    pub fn interrupt(&self) {
        self.interrupt.store(true, Ordering::SeqCst);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }

    /// True if either flag is set.
    pub fn is_cancelled(&self) -> bool {
        self.is_stop_requested() || self.is_interrupted()
    }

    /// Clear both flags so the token can be reused for another run.
    pub fn reset(&self) {
        self.stop.store(false, Ordering::SeqCst);
        self.interrupt.store(false, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Bind the process' Ctrl-C signal to the interrupt flag of the given token.
///
/// Only one handler may be installed per process.
pub fn install_ctrlc_handler(token: &CancelToken) -> Result<(), ctrlc::Error> {
    let t = token.clone();

    ctrlc::set_handler(move || {
        warn!("Ctrl-C pressed, interrupting execution");
        t.interrupt();
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_clones_share_flags() {
        let a = CancelToken::new();
        let b = a.clone();
        let other = CancelToken::new();

        assert!(!a.is_cancelled());

        b.request_stop();
        assert!(a.is_stop_requested());
        assert!(a.is_cancelled());
        assert!(!a.is_interrupted());
        assert!(!other.is_cancelled());

        a.interrupt();
        assert!(b.is_interrupted());

        b.reset();
        assert!(!a.is_cancelled());
    }

    #[test]
    fn test_interrupt_from_thread() {
        let token = CancelToken::new();
        let t = token.clone();

        std::thread::spawn(move || t.interrupt()).join().unwrap();

        assert!(token.is_interrupted());
    }
}
