//! Handshake server metrics.
//!
//! Atomic counters, updated by the listener and the per-connection tasks.
//!
//! ```ignore
//! use mysql_handshake::server::HandshakeMetrics;
//!
//! let metrics = HandshakeMetrics::shared();
//! metrics.connection_accepted();
//! metrics.auth_success();
//!
//! let snapshot = metrics.snapshot();
//! println!("Active connections: {}", snapshot.connections_active);
//! ```
//!
//! ## Connection Metrics
//! - `connections_accepted`: Total connections accepted
//! - `connections_active`: Currently open connections
//! - `connections_rejected_limit`: Refused with ER_CON_COUNT_ERROR
//!
//! ## Handshake Metrics
//! - `auth_successes` / `auth_failures`: Credential check outcomes
//! - `protocol_errors`: Malformed or out-of-order handshake packets
//! - `handshake_timeouts`: Handshakes that hit the configured deadline
//!
//! ## Command Metrics
//! - `commands_handled`: Commands answered after authentication

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Relaxed is enough for independent counters.
const METRIC_ORDERING: Ordering = Ordering::Relaxed;

#[derive(Debug, Default)]
pub struct HandshakeMetrics {
    // ========================================================================
    // Connection Metrics
    // ========================================================================
    /// Total connections accepted since startup
    pub connections_accepted: AtomicU64,
    /// Currently open connections
    pub connections_active: AtomicU64,
    /// Connections refused because max_connections was reached
    pub connections_rejected_limit: AtomicU64,

    // ========================================================================
    // Handshake Metrics
    // ========================================================================
    /// Handshakes that ended in OK
    pub auth_successes: AtomicU64,
    /// Handshakes rejected by the credential check
    pub auth_failures: AtomicU64,
    /// Handshakes that failed on a malformed or unexpected packet
    pub protocol_errors: AtomicU64,
    /// Handshakes that did not finish in time
    pub handshake_timeouts: AtomicU64,

    // ========================================================================
    // Command Metrics
    // ========================================================================
    /// Commands answered after authentication
    pub commands_handled: AtomicU64,
}

impl HandshakeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Record a new connection accepted.
    pub fn connection_accepted(&self) {
        self.connections_accepted.fetch_add(1, METRIC_ORDERING);
        self.connections_active.fetch_add(1, METRIC_ORDERING);
    }

    /// Record a connection closed.
    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, METRIC_ORDERING);
    }

    /// Record a connection refused due to the limit.
    pub fn connection_rejected_limit(&self) {
        self.connections_rejected_limit.fetch_add(1, METRIC_ORDERING);
    }

    pub fn auth_success(&self) {
        self.auth_successes.fetch_add(1, METRIC_ORDERING);
    }

    pub fn auth_failure(&self) {
        self.auth_failures.fetch_add(1, METRIC_ORDERING);
    }

    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, METRIC_ORDERING);
    }

    pub fn handshake_timeout(&self) {
        self.handshake_timeouts.fetch_add(1, METRIC_ORDERING);
    }

    pub fn command_handled(&self) {
        self.commands_handled.fetch_add(1, METRIC_ORDERING);
    }

    /// Point-in-time copy of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_accepted: self.connections_accepted.load(METRIC_ORDERING),
            connections_active: self.connections_active.load(METRIC_ORDERING),
            connections_rejected_limit: self.connections_rejected_limit.load(METRIC_ORDERING),

            auth_successes: self.auth_successes.load(METRIC_ORDERING),
            auth_failures: self.auth_failures.load(METRIC_ORDERING),
            protocol_errors: self.protocol_errors.load(METRIC_ORDERING),
            handshake_timeouts: self.handshake_timeouts.load(METRIC_ORDERING),

            commands_handled: self.commands_handled.load(METRIC_ORDERING),
        }
    }
}

/// Plain copy of [`HandshakeMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub connections_accepted: u64,
    pub connections_active: u64,
    pub connections_rejected_limit: u64,

    pub auth_successes: u64,
    pub auth_failures: u64,
    pub protocol_errors: u64,
    pub handshake_timeouts: u64,

    pub commands_handled: u64,
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Handshake Metrics ===")?;
        writeln!(f)?;
        writeln!(f, "Connections:")?;
        writeln!(f, "  Accepted:  {}", self.connections_accepted)?;
        writeln!(f, "  Active:    {}", self.connections_active)?;
        writeln!(f, "  Rejected:  {}", self.connections_rejected_limit)?;
        writeln!(f)?;
        writeln!(f, "Handshakes:")?;
        writeln!(f, "  Authenticated:   {}", self.auth_successes)?;
        writeln!(f, "  Auth Failures:   {}", self.auth_failures)?;
        writeln!(f, "  Protocol Errors: {}", self.protocol_errors)?;
        writeln!(f, "  Timeouts:        {}", self.handshake_timeouts)?;
        writeln!(f)?;
        writeln!(f, "Commands:")?;
        writeln!(f, "  Handled: {}", self.commands_handled)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_default() {
        let snapshot = HandshakeMetrics::new().snapshot();
        assert_eq!(snapshot, MetricsSnapshot::default());
    }

    #[test]
    fn test_connection_lifecycle() {
        let metrics = HandshakeMetrics::new();

        metrics.connection_accepted();
        metrics.connection_accepted();
        assert_eq!(metrics.connections_accepted.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.connections_active.load(Ordering::Relaxed), 2);

        metrics.connection_closed();
        assert_eq!(metrics.connections_accepted.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.connections_active.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_handshake_outcomes() {
        let metrics = HandshakeMetrics::new();

        metrics.auth_success();
        metrics.auth_failure();
        metrics.auth_failure();
        metrics.protocol_error();
        metrics.handshake_timeout();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.auth_successes, 1);
        assert_eq!(snapshot.auth_failures, 2);
        assert_eq!(snapshot.protocol_errors, 1);
        assert_eq!(snapshot.handshake_timeouts, 1);
    }

    #[test]
    fn test_snapshot_display() {
        let metrics = HandshakeMetrics::new();
        metrics.connection_accepted();
        metrics.connection_rejected_limit();

        let display = format!("{}", metrics.snapshot());
        assert!(display.contains("Accepted:  1"));
        assert!(display.contains("Rejected:  1"));
    }

    #[test]
    fn test_shared_metrics() {
        let metrics = HandshakeMetrics::shared();
        let metrics2 = Arc::clone(&metrics);

        metrics.command_handled();
        metrics2.command_handled();

        assert_eq!(metrics.snapshot().commands_handled, 2);
    }
}
