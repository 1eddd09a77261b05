//! Server side of the connection phase
//!
//! This module contains:
//! - Transport contract and MySQL packet framing
//! - Server identity contract
//! - Handshake orchestrator
//! - Post-handshake command loop
//! - TCP listener and metrics

pub mod handshake;
pub mod identity;
pub mod listener;
pub mod metrics;
pub mod session;
pub mod transport;

pub use handshake::{handshake, HandshakeState, ServerConn};
pub use identity::{IdentityFactory, ServerIdentity};
pub use listener::Listener;
pub use metrics::{HandshakeMetrics, MetricsSnapshot};
pub use session::{run_session, SessionEnd};
pub use transport::{
    PacketStream, Transport, DEFAULT_MAX_ALLOWED_PACKET, DEFAULT_MAX_HANDSHAKE_PACKET,
};
