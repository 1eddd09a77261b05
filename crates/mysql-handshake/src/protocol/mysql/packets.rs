//! MySQL packet structures and protocol constants for the connection phase.
//!
//! Reference: <https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_connection_phase.html>

/// Handshake protocol version written into every greeting
pub const PROTOCOL_VERSION: u8 = 10;

/// Total auth-plugin-data length (8 bytes in part 1, 12 in part 2)
pub const SALT_LEN: usize = 20;

/// Length of auth-plugin-data part 1
pub const SALT_PART1_LEN: usize = 8;

/// OK packet marker
pub const OK_HEADER: u8 = 0x00;

/// ERR packet marker
pub const ERR_HEADER: u8 = 0xFF;

/// SQL state marker inside protocol-41 ERR packets
pub const SQL_STATE_MARKER: u8 = b'#';

/// utf8_general_ci
pub const DEFAULT_COLLATION_ID: u8 = 33;

/// MySQL packet header (4 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Payload length (3 bytes, max 16MB - 1)
    pub payload_length: u32,
    /// Sequence ID (1 byte)
    pub sequence_id: u8,
}

impl PacketHeader {
    /// Maximum payload size of a single packet (2^24 - 1)
    pub const MAX_PAYLOAD_LENGTH: u32 = 0xFF_FF_FF;

    pub fn new(payload_length: u32, sequence_id: u8) -> Self {
        Self {
            payload_length,
            sequence_id,
        }
    }

    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self {
            payload_length: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]),
            sequence_id: bytes[3],
        }
    }

    pub fn to_bytes(self) -> [u8; 4] {
        let len = self.payload_length.to_le_bytes();
        [len[0], len[1], len[2], self.sequence_id]
    }
}

/// Initial handshake (Protocol::HandshakeV10) as sent by this server.
///
/// Built from a [`ServerIdentity`](crate::server::ServerIdentity) snapshot;
/// see [`build_greeting`](super::build_greeting) for the exact layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Greeting {
    /// Server version string (written NUL-terminated)
    pub server_version: Vec<u8>,
    /// Connection ID
    pub connection_id: u32,
    /// 20-byte scramble, split 8 + 12 on the wire
    pub salt: Vec<u8>,
    /// Capabilities offered by the server
    pub capability_flags: u32,
    /// Default collation id
    pub collation: u8,
    /// Server status flags
    pub status_flags: u16,
}

/// Client reply to the greeting.
///
/// Covers both Protocol::HandshakeResponse41 and the pre-4.1
/// Protocol::HandshakeResponse320 layouts; `capability_flags` tells which one
/// the client used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    /// Capability flags as sent by the client
    pub capability_flags: u32,
    /// Max packet size the client wants to send
    pub max_packet_size: u32,
    /// Client collation (protocol-41 only)
    pub character_set: u8,
    /// Username
    pub username: String,
    /// Scrambled password, empty when no password is used
    pub auth_response: Vec<u8>,
    /// Database requested with CLIENT_CONNECT_WITH_DB
    pub database: Option<String>,
    /// Auth plugin the client used (CLIENT_PLUGIN_AUTH)
    pub auth_plugin_name: Option<String>,
}

impl Default for HandshakeResponse {
    fn default() -> Self {
        Self {
            capability_flags: 0,
            max_packet_size: PacketHeader::MAX_PAYLOAD_LENGTH,
            character_set: DEFAULT_COLLATION_ID,
            username: String::new(),
            auth_response: Vec::new(),
            database: None,
            auth_plugin_name: None,
        }
    }
}

impl HandshakeResponse {
    /// True when the client speaks the 4.1+ protocol
    pub fn is_protocol41(&self) -> bool {
        self.capability_flags & CLIENT_PROTOCOL_41 != 0
    }

    /// Requested database, or "" when none was sent
    pub fn database_or_empty(&self) -> &str {
        self.database.as_deref().unwrap_or("")
    }
}

/// Result summary carried by an OK packet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OkResult {
    pub affected_rows: u64,
    pub last_insert_id: u64,
    pub status_flags: u16,
    pub warnings: u16,
}

impl OkResult {
    /// Empty result carrying only the given status flags
    pub fn with_status(status_flags: u16) -> Self {
        Self {
            status_flags,
            ..Self::default()
        }
    }
}

// ============================================================================
// Capability Flags
// Reference: https://dev.mysql.com/doc/dev/mysql-server/latest/group__group__cs__capabilities__flags.html
// ============================================================================

/// New more secure passwords
pub const CLIENT_LONG_PASSWORD: u32 = 0x0000_0001;
/// Found instead of affected rows
pub const CLIENT_FOUND_ROWS: u32 = 0x0000_0002;
/// Get all column flags
pub const CLIENT_LONG_FLAG: u32 = 0x0000_0004;
/// Database name may follow the auth response
pub const CLIENT_CONNECT_WITH_DB: u32 = 0x0000_0008;
/// Don't allow database.table.column
pub const CLIENT_NO_SCHEMA: u32 = 0x0000_0010;
/// Compression protocol
pub const CLIENT_COMPRESS: u32 = 0x0000_0020;
/// Can use LOAD DATA LOCAL
pub const CLIENT_LOCAL_FILES: u32 = 0x0000_0080;
/// 4.1 protocol: SQL states in ERR, status and warnings in OK
pub const CLIENT_PROTOCOL_41: u32 = 0x0000_0200;
/// Interactive client (wait_timeout vs interactive_timeout)
pub const CLIENT_INTERACTIVE: u32 = 0x0000_0400;
/// Switch to SSL after handshake
pub const CLIENT_SSL: u32 = 0x0000_0800;
/// Client knows about transactions
pub const CLIENT_TRANSACTIONS: u32 = 0x0000_2000;
/// 4.1 authentication: length-prefixed auth response
pub const CLIENT_SECURE_CONNECTION: u32 = 0x0000_8000;
/// Multi-statement support
pub const CLIENT_MULTI_STATEMENTS: u32 = 0x0001_0000;
/// Multi-results support
pub const CLIENT_MULTI_RESULTS: u32 = 0x0002_0000;
/// Pluggable authentication
pub const CLIENT_PLUGIN_AUTH: u32 = 0x0008_0000;
/// Connection attributes
pub const CLIENT_CONNECT_ATTRS: u32 = 0x0010_0000;
/// Auth response length is a length-encoded integer
pub const CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA: u32 = 0x0020_0000;
/// No EOF packets after result sets
pub const CLIENT_DEPRECATE_EOF: u32 = 0x0100_0000;

/// Capabilities offered in the greeting unless configured otherwise.
///
/// Deliberately without CLIENT_PLUGIN_AUTH (the greeting carries no plugin
/// name) and CLIENT_SSL (TLS is not negotiated).
pub const DEFAULT_SERVER_CAPABILITIES: u32 = CLIENT_LONG_PASSWORD
    | CLIENT_LONG_FLAG
    | CLIENT_CONNECT_WITH_DB
    | CLIENT_PROTOCOL_41
    | CLIENT_TRANSACTIONS
    | CLIENT_SECURE_CONNECTION;

// ============================================================================
// Status Flags
// ============================================================================

/// Server status: in transaction
pub const SERVER_STATUS_IN_TRANS: u16 = 0x0001;
/// Server status: auto-commit enabled
pub const SERVER_STATUS_AUTOCOMMIT: u16 = 0x0002;

// ============================================================================
// Commands understood after authentication
// ============================================================================

/// Close the connection (COM_QUIT)
pub const COM_QUIT: u8 = 0x01;
/// Switch database (COM_INIT_DB)
pub const COM_INIT_DB: u8 = 0x02;
/// Liveness check (COM_PING)
pub const COM_PING: u8 = 0x0e;
