//! Daemon subsystem: OS signal handling for the background scheduler.

#[cfg(feature = "daemon")]
pub mod signals;
