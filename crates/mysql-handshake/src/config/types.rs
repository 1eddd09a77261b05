//! Configuration types

use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;

use crate::protocol::mysql::{
    CLIENT_COMPRESS, CLIENT_PLUGIN_AUTH, CLIENT_PROTOCOL_41, CLIENT_SECURE_CONNECTION, CLIENT_SSL,
    DEFAULT_COLLATION_ID, DEFAULT_SERVER_CAPABILITIES, SERVER_STATUS_AUTOCOMMIT,
};
use crate::server::{DEFAULT_MAX_ALLOWED_PACKET, DEFAULT_MAX_HANDSHAKE_PACKET};

/// Capabilities the server can never offer: no TLS, no compression and no
/// plugin name in the greeting.
pub const UNSUPPORTED_CAPABILITIES: u32 = CLIENT_SSL | CLIENT_COMPRESS | CLIENT_PLUGIN_AUTH;

/// Root configuration structure
///
/// ```yaml
/// server:
///   listen_port: 3306
///
/// identity:
///   server_version: "5.7.44-handshake"
///   default_database: "app"
///
/// users:
///   - username: root
///     password: "${ROOT_PASSWORD}"
///   - username: reporting
///     password: secret
///     databases: [reports]
/// ```
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,

    /// Values advertised in the greeting
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Accounts allowed to log in
    #[serde(default)]
    pub users: Vec<UserConfig>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.identity.collation_id == 0 {
            return Err("identity.collation_id must be non-zero".into());
        }

        if self.server.max_handshake_packet == 0 || self.server.max_allowed_packet == 0 {
            return Err(
                "server.max_handshake_packet and server.max_allowed_packet must be non-zero"
                    .into(),
            );
        }

        if self.identity.server_version.contains('\0') {
            return Err("identity.server_version must not contain NUL bytes".into());
        }

        let caps = self.identity.capabilities;
        if caps & UNSUPPORTED_CAPABILITIES != 0 {
            return Err(format!(
                "identity.capabilities 0x{:08X} include unsupported flags 0x{:08X}",
                caps,
                caps & UNSUPPORTED_CAPABILITIES
            ));
        }
        if caps & CLIENT_SECURE_CONNECTION != 0 && caps & CLIENT_PROTOCOL_41 == 0 {
            return Err(
                "identity.capabilities: CLIENT_SECURE_CONNECTION requires CLIENT_PROTOCOL_41"
                    .into(),
            );
        }

        let mut seen = HashSet::new();
        for user in &self.users {
            if user.username.is_empty() {
                return Err("users: username must not be empty".into());
            }
            if !seen.insert(user.username.as_str()) {
                return Err(format!("users: duplicate username '{}'", user.username));
            }
        }

        Ok(())
    }
}

/// Server listener configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    /// Port to listen on
    pub listen_port: u16,
    /// Deadline for the whole connection phase, in seconds (0 = none)
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,
    /// Maximum number of concurrent connections (0 = unlimited)
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Largest packet accepted before the client has authenticated
    #[serde(default = "default_max_handshake_packet")]
    pub max_handshake_packet: usize,
    /// Largest packet accepted once authenticated
    #[serde(default = "default_max_allowed_packet")]
    pub max_allowed_packet: usize,
}

/// What the server claims to be in the greeting
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    /// Server version string
    #[serde(default = "default_server_version")]
    pub server_version: String,
    /// Collation id (33 = utf8_general_ci)
    #[serde(default = "default_collation_id")]
    pub collation_id: u8,
    /// Server status flags
    #[serde(default = "default_status_flags")]
    pub status_flags: u16,
    /// Capability flags offered to clients
    #[serde(default = "default_capabilities")]
    pub capabilities: u32,
    /// Database for clients that do not name one
    #[serde(default)]
    pub default_database: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            server_version: default_server_version(),
            collation_id: default_collation_id(),
            status_flags: default_status_flags(),
            capabilities: default_capabilities(),
            default_database: String::new(),
        }
    }
}

/// One login account
#[derive(Clone, Deserialize)]
pub struct UserConfig {
    pub username: String,
    /// Plain-text password; `${VAR}` and `$VAR` are resolved from the environment
    #[serde(default)]
    pub password: String,
    /// Databases the user may select. Empty means any.
    #[serde(default)]
    pub databases: Vec<String>,
}

impl fmt::Debug for UserConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserConfig")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("databases", &self.databases)
            .finish()
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Whether to log packet contents
    #[serde(default)]
    pub protocol_debug: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            protocol_debug: false,
        }
    }
}

fn default_listen_address() -> String {
    "127.0.0.1".to_string()
}

fn default_handshake_timeout() -> u64 {
    10
}

fn default_max_connections() -> usize {
    1000
}

fn default_max_handshake_packet() -> usize {
    DEFAULT_MAX_HANDSHAKE_PACKET
}

fn default_max_allowed_packet() -> usize {
    DEFAULT_MAX_ALLOWED_PACKET
}

fn default_server_version() -> String {
    concat!("5.7.44-mysql-handshake-", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_collation_id() -> u8 {
    DEFAULT_COLLATION_ID
}

fn default_status_flags() -> u16 {
    SERVER_STATUS_AUTOCOMMIT
}

fn default_capabilities() -> u32 {
    DEFAULT_SERVER_CAPABILITIES
}

fn default_log_level() -> String {
    "info".to_string()
}
