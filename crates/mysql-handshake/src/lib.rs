//! mysql-handshake - server side of the MySQL connection phase
//!
//! This library lets a process act as a MySQL server for the handshake:
//! - Sends the HandshakeV10 greeting and decodes the client's response
//! - Negotiates capability flags (protocol-41 and legacy clients)
//! - Hands credentials to a pluggable [`server::ServerIdentity`]
//! - Encodes OK and ERR packets, with MySQL error codes and SQL states
//!
//! [`server::handshake`] works over any [`server::Transport`];
//! [`server::Listener`] runs it for TCP clients against a
//! [`auth::StaticAuthority`] built from the [`config`].

#[macro_use]
mod logging;

pub mod auth;
pub mod config;
pub mod error;
pub mod protocol;
pub mod server;

pub use auth::{IdentitySettings, StaticAuthority, StaticIdentity, UserAccount};
pub use config::Config;
pub use error::{HandshakeError, Result};
pub use protocol::mysql::ServerError;
pub use server::{
    handshake, HandshakeMetrics, HandshakeState, IdentityFactory, Listener, MetricsSnapshot,
    PacketStream, ServerConn, ServerIdentity, Transport,
};
