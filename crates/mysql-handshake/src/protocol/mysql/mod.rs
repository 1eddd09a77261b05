//! MySQL connection-phase protocol
//!
//! This module contains:
//! - Error codes, SQL states and message templates
//! - Structured server errors
//! - Packet structures
//! - Packet encoding and decoding
//! - mysql_native_password salt and verification

pub mod auth;
pub mod codes;
pub mod packets;
pub mod parser;
pub mod server_error;

pub use packets::*;
pub use parser::*;
pub use server_error::ServerError;
