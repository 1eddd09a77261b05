//! Error types for mysql-handshake

use thiserror::Error;

use crate::protocol::mysql::ServerError;

/// Main error type for the handshake server
#[derive(Error, Debug)]
pub enum HandshakeError {
    /// I/O error on the underlying connection
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed or truncated packet, or out-of-order sequence id
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Structured server error (authentication failures, refused requests)
    #[error("{0}")]
    Server(#[from] ServerError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),
}

impl HandshakeError {
    /// Returns the structured server error, if this is one.
    pub fn as_server_error(&self) -> Option<&ServerError> {
        match self {
            HandshakeError::Server(e) => Some(e),
            _ => None,
        }
    }

    /// True for failures of the underlying byte stream.
    pub fn is_transport(&self) -> bool {
        matches!(self, HandshakeError::Io(_))
    }
}

/// Result type alias for HandshakeError
pub type Result<T> = std::result::Result<T, HandshakeError>;

impl From<serde_yaml::Error> for HandshakeError {
    fn from(err: serde_yaml::Error) -> Self {
        HandshakeError::Config(err.to_string())
    }
}
