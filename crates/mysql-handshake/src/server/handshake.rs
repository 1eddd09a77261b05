//! Server side of the MySQL connection phase.
//!
//! [`handshake`] drives the single round trip:
//!
//! 1. Send HandshakeV10 built from the [`ServerIdentity`]
//! 2. Read the client's HandshakeResponse and negotiate capabilities
//! 3. Let the identity check the credentials
//! 4. Reply OK (and reset the sequence) or ERR (and close)
//!
//! There is no retry. Every failure closes the transport and returns the
//! error; success returns an authenticated [`ServerConn`].

use std::fmt;

use super::identity::ServerIdentity;
use super::transport::Transport;
use crate::error::{HandshakeError, Result};
use crate::protocol::mysql::{
    build_err_packet, build_greeting, build_ok_packet, parse_handshake_response, read_u16_le,
    read_u32_le, Greeting, OkResult, ServerError, CLIENT_PROTOCOL_41,
};

/// Host reported in access-denied messages when the peer address is unknown
const UNKNOWN_HOST: &str = "localhost";

/// Connection-phase state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Nothing sent yet
    Start,
    /// HandshakeV10 written
    GreetingSent,
    /// Client response decoded
    ResponseReceived,
    /// OK written, sequence reset
    Authenticated,
    /// Handshake failed, transport closed
    Rejected,
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandshakeState::Start => "start",
            HandshakeState::GreetingSent => "greeting_sent",
            HandshakeState::ResponseReceived => "response_received",
            HandshakeState::Authenticated => "authenticated",
            HandshakeState::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

/// A connection that completed the handshake.
///
/// Owns its identity and transport. Later protocol phases use the
/// `write_*`/`read_packet` helpers, which encode OK/ERR according to the
/// negotiated capabilities.
pub struct ServerConn<I, T> {
    identity: I,
    transport: T,
    state: HandshakeState,
    username: String,
    database: String,
}

/// Run the connection phase on `transport` as `identity`.
///
/// # Errors
///
/// * transport errors from writing the greeting or reading the response;
///   no ERR packet is attempted
/// * decode failures, after a best-effort ERR packet
/// * whatever [`ServerIdentity::check_auth`] returned, after a best-effort
///   ERR packet
/// * a failed OK write
///
/// The transport is closed in every error case.
pub async fn handshake<I, T>(identity: I, transport: T) -> Result<ServerConn<I, T>>
where
    I: ServerIdentity,
    T: Transport,
{
    let mut conn = ServerConn {
        identity,
        transport,
        state: HandshakeState::Start,
        username: String::new(),
        database: String::new(),
    };

    match conn.run().await {
        Ok(()) => Ok(conn),
        Err(e) => {
            conn.set_state(HandshakeState::Rejected);
            if let Err(close_err) = conn.transport.close().await {
                trace!(
                    conn_id = conn.identity.connection_id(),
                    error = %close_err,
                    "Error closing rejected connection"
                );
            }
            Err(e)
        }
    }
}

impl<I, T> ServerConn<I, T>
where
    I: ServerIdentity,
    T: Transport,
{
    async fn run(&mut self) -> Result<()> {
        let conn_id = self.identity.connection_id();

        // Step 1: greeting. A failed write means the channel is gone.
        let greeting = Greeting {
            server_version: self.identity.server_version().to_vec(),
            connection_id: conn_id,
            salt: self.identity.salt().to_vec(),
            capability_flags: self.identity.capabilities(),
            collation: self.identity.collation(),
            status_flags: self.identity.status_flags(),
        };
        self.transport.write_packet(&build_greeting(&greeting)).await?;
        self.set_state(HandshakeState::GreetingSent);

        // Step 2: response
        let payload = match self.transport.read_packet().await {
            Ok(payload) => payload,
            Err(e) => {
                if !e.is_transport() {
                    self.try_write_error(&e).await;
                }
                return Err(e);
            }
        };

        // Negotiate before decoding so that an ERR for a bad packet is
        // already encoded the way the client expects.
        if let Some(client_flags) = peek_client_capabilities(&payload) {
            let negotiated = client_flags & self.identity.capabilities();
            debug!(
                conn_id,
                client = format_args!("0x{:08X}", client_flags),
                negotiated = format_args!("0x{:08X}", negotiated),
                "Capabilities negotiated"
            );
            self.identity.set_capabilities(negotiated);
        }

        let host = self.peer_host();
        let response = match parse_handshake_response(&payload, &host) {
            Ok(response) => response,
            Err(e) => {
                warn!(conn_id, error = %e, "Invalid handshake response");
                self.try_write_error(&e).await;
                return Err(e);
            }
        };
        self.set_state(HandshakeState::ResponseReceived);

        // Step 3: credentials
        let database = response.database_or_empty();
        if let Err(e) = self
            .identity
            .check_auth(&response.username, &response.auth_response, database)
            .await
        {
            warn!(
                conn_id,
                user = %response.username,
                host = %host,
                error = %e,
                "Authentication failed"
            );
            self.try_write_error(&e).await;
            return Err(e);
        }

        // Step 4: OK, then start numbering from zero for the command phase
        let ok = OkResult::with_status(self.identity.status_flags());
        self.transport
            .write_packet(&build_ok_packet(&ok, self.identity.capabilities()))
            .await?;
        self.transport.reset_sequence();

        self.database = if database.is_empty() {
            self.identity.default_database().to_string()
        } else {
            database.to_string()
        };
        self.username = response.username;
        self.set_state(HandshakeState::Authenticated);

        info!(
            conn_id,
            user = %self.username,
            database = %self.database,
            "Client authenticated"
        );

        Ok(())
    }

    fn set_state(&mut self, state: HandshakeState) {
        debug!(
            conn_id = self.identity.connection_id(),
            from = %self.state,
            to = %state,
            "Handshake state change"
        );
        self.state = state;
    }

    fn peer_host(&self) -> String {
        self.transport
            .peer_addr()
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| UNKNOWN_HOST.to_string())
    }

    /// Best-effort ERR; the caller is failing anyway.
    async fn try_write_error(&mut self, err: &HandshakeError) {
        if let Err(write_err) = self.write_error(err).await {
            debug!(
                conn_id = self.identity.connection_id(),
                error = %write_err,
                "Could not deliver ERR packet"
            );
        }
    }

    /// Write an OK packet.
    ///
    /// Without a result, one is synthesized from the identity's current
    /// status flags with zero affected rows and insert id.
    pub async fn write_ok(&mut self, result: Option<&OkResult>) -> Result<()> {
        let ok = match result {
            Some(ok) => *ok,
            None => OkResult::with_status(self.identity.status_flags()),
        };
        let payload = build_ok_packet(&ok, self.identity.capabilities());
        self.transport.write_packet(&payload).await
    }

    /// Write `err` as an ERR packet, wrapping non-server errors as
    /// `ER_UNKNOWN_ERROR`.
    pub async fn write_error(&mut self, err: &HandshakeError) -> Result<()> {
        self.write_server_error(&ServerError::from_error(err)).await
    }

    pub async fn write_server_error(&mut self, err: &ServerError) -> Result<()> {
        let payload = build_err_packet(err, self.identity.capabilities());
        self.transport.write_packet(&payload).await
    }

    pub async fn read_packet(&mut self) -> Result<Vec<u8>> {
        self.transport.read_packet().await
    }

    pub async fn write_packet(&mut self, payload: &[u8]) -> Result<()> {
        self.transport.write_packet(payload).await
    }

    pub fn reset_sequence(&mut self) {
        self.transport.reset_sequence();
    }

    pub async fn close(&mut self) -> Result<()> {
        self.transport.close().await
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Authenticated user name
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Current database; the identity's default when the client sent none
    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn set_database(&mut self, database: impl Into<String>) {
        self.database = database.into();
    }

    /// Negotiated capability flags
    pub fn capabilities(&self) -> u32 {
        self.identity.capabilities()
    }

    pub fn connection_id(&self) -> u32 {
        self.identity.connection_id()
    }

    pub fn identity(&self) -> &I {
        &self.identity
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_parts(self) -> (I, T) {
        (self.identity, self.transport)
    }
}

/// Client capability flags from the start of a HandshakeResponse.
///
/// Protocol-41 clients send 4 bytes, older ones 2.
fn peek_client_capabilities(payload: &[u8]) -> Option<u32> {
    let lower = read_u16_le(payload).ok()? as u32;
    if lower & CLIENT_PROTOCOL_41 != 0 {
        read_u32_le(payload).ok().or(Some(lower))
    } else {
        Some(lower)
    }
}
