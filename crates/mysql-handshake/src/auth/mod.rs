//! Account store and the default [`ServerIdentity`](crate::server::ServerIdentity).
//!
//! - [`UserAccount`] - one login, password kept as `SHA1(SHA1(password))`
//! - [`StaticAuthority`] - accounts from configuration, shared by all connections
//! - [`StaticIdentity`] - per-connection identity handed out by the authority
//!
//! # Example
//!
//! ```
//! use mysql_handshake::auth::{IdentitySettings, StaticAuthority, UserAccount};
//! use mysql_handshake::server::ServerIdentity;
//!
//! let authority = StaticAuthority::new(
//!     IdentitySettings::default(),
//!     vec![UserAccount::new("root", "secret")],
//! );
//!
//! let identity = authority.identity(None);
//! assert_eq!(identity.salt().len(), 20);
//! ```

mod account;
mod static_authority;

pub use account::UserAccount;
pub use static_authority::{IdentitySettings, StaticAuthority, StaticIdentity};
