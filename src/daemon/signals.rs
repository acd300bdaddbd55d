//! Signal handling: SIGTERM/SIGINT graceful shutdown for the scheduler.
//!
//! Uses the `signal-hook` crate for safe signal registration; the scheduler
//! polls the flag via `crossbeam_channel::Receiver::recv_timeout` rather
//! than blocking on the signal itself.

#![allow(missing_docs)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use signal_hook::consts::{SIGINT, SIGTERM};

/// Thread-safe shutdown flag shared between the signal handler and the
/// scheduler's worker thread.
#[derive(Clone)]
pub struct SignalHandler {
    shutdown_flag: Arc<AtomicBool>,
}

impl SignalHandler {
    /// Create a new handler and register OS signal hooks.
    ///
    /// Registration is best-effort; failures are logged to stderr but not
    /// fatal (the process can still be shut down by a direct
    /// `request_shutdown` call, e.g. from a CLI `daemon stop`).
    #[must_use]
    pub fn new() -> Self {
        let handler = Self {
            shutdown_flag: Arc::new(AtomicBool::new(false)),
        };
        handler.register_signals();
        handler
    }

    /// Check whether a shutdown has been requested.
    #[must_use]
    pub fn should_shutdown(&self) -> bool {
        self.shutdown_flag.load(Ordering::Relaxed)
    }

    /// Programmatically request shutdown.
    pub fn request_shutdown(&self) {
        self.shutdown_flag.store(true, Ordering::Relaxed);
    }

    /// Shared handle to the underlying flag, for components (like the
    /// scheduler) that want to poll it directly rather than through `self`.
    #[must_use]
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown_flag)
    }

    fn register_signals(&self) {
        if let Err(error) = signal_hook::flag::register(SIGTERM, Arc::clone(&self.shutdown_flag))
        {
            eprintln!("[DRN-SIGNAL] failed to register SIGTERM: {error}");
        }
        if let Err(error) = signal_hook::flag::register(SIGINT, Arc::clone(&self.shutdown_flag)) {
            eprintln!("[DRN-SIGNAL] failed to register SIGINT: {error}");
        }
    }
}

impl Default for SignalHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_not_shutting_down() {
        let handler = SignalHandler {
            shutdown_flag: Arc::new(AtomicBool::new(false)),
        };
        assert!(!handler.should_shutdown());
    }

    #[test]
    fn programmatic_shutdown_request() {
        let handler = SignalHandler {
            shutdown_flag: Arc::new(AtomicBool::new(false)),
        };
        handler.request_shutdown();
        assert!(handler.should_shutdown());
    }

    #[test]
    fn handler_is_clone_and_shares_state() {
        let handler = SignalHandler {
            shutdown_flag: Arc::new(AtomicBool::new(false)),
        };
        let clone = handler.clone();
        handler.request_shutdown();
        assert!(clone.should_shutdown());
    }

    #[test]
    fn flag_handle_shares_state_with_handler() {
        let handler = SignalHandler {
            shutdown_flag: Arc::new(AtomicBool::new(false)),
        };
        let flag = handler.flag();
        handler.request_shutdown();
        assert!(flag.load(Ordering::Relaxed));
    }
}
