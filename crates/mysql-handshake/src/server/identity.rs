//! Server identity contract.
//!
//! The handshake never decides who may log in. It asks a [`ServerIdentity`]
//! for the values it advertises in the greeting and hands the decoded
//! credentials back to it. Production code uses
//! [`StaticIdentity`](crate::auth::StaticIdentity); tests supply their own.

use std::net::SocketAddr;

use async_trait::async_trait;

use crate::error::Result;

/// Per-connection server identity.
///
/// One instance is bound to exactly one handshake and is never shared
/// between connections, so the mutable capability flags need no locking.
#[async_trait]
pub trait ServerIdentity: Send + Sync {
    /// Connection id, unique among live connections
    fn connection_id(&self) -> u32;

    /// 20-byte auth-plugin-data sent in the greeting
    fn salt(&self) -> &[u8];

    /// Collation id advertised in the greeting
    fn collation(&self) -> u8;

    /// Server status bitmap
    fn status_flags(&self) -> u16;

    /// Current capability flags.
    ///
    /// Server-offered flags until the response is parsed, the negotiated
    /// intersection afterwards.
    fn capabilities(&self) -> u32;

    fn set_capabilities(&mut self, capabilities: u32);

    /// Server version string, without NUL
    fn server_version(&self) -> &[u8];

    /// Database used when the client did not ask for one. May be empty.
    fn default_database(&self) -> &str;

    /// Verify credentials.
    ///
    /// `database` is empty when the client did not send one. A structured
    /// [`ServerError`](crate::protocol::mysql::ServerError) is written to
    /// the client as is; any other error is wrapped as `ER_UNKNOWN_ERROR`.
    async fn check_auth(&self, user: &str, auth_response: &[u8], database: &str) -> Result<()>;

    /// Verify that an authenticated `user` may switch to `database`.
    ///
    /// Used by `COM_INIT_DB` after the handshake. Allows everything by default.
    async fn check_database(&self, _user: &str, _database: &str) -> Result<()> {
        Ok(())
    }
}

/// Creates a fresh identity for each accepted connection
pub trait IdentityFactory: Send + Sync + 'static {
    type Identity: ServerIdentity + 'static;

    fn identity_for(&self, peer: Option<SocketAddr>) -> Self::Identity;
}
