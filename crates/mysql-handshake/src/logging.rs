//! Logging macros that set target to "mysql_handshake" for all log calls.
//!
//! Without an explicit target, tracing uses the full module path
//! (e.g., "mysql_handshake::server::handshake"). These macros keep every
//! event from this crate under a single target so one filter directive
//! (`mysql_handshake=debug`) controls the whole library.

#![allow(unused_macros)]

macro_rules! trace {
    ($($arg:tt)*) => { ::tracing::trace!(target: "mysql_handshake", $($arg)*) };
}

macro_rules! debug {
    ($($arg:tt)*) => { ::tracing::debug!(target: "mysql_handshake", $($arg)*) };
}

macro_rules! info {
    ($($arg:tt)*) => { ::tracing::info!(target: "mysql_handshake", $($arg)*) };
}

macro_rules! warn {
    ($($arg:tt)*) => { ::tracing::warn!(target: "mysql_handshake", $($arg)*) };
}

macro_rules! error {
    ($($arg:tt)*) => { ::tracing::error!(target: "mysql_handshake", $($arg)*) };
}
