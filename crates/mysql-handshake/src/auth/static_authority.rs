//! Identity backed by a fixed set of accounts.
//!
//! [`StaticAuthority`] is built once from the configuration and shared by the
//! listener. For every accepted connection it hands out a [`StaticIdentity`]
//! with its own connection id and salt.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use super::UserAccount;
use crate::config::Config;
use crate::error::Result;
use crate::protocol::mysql::auth::generate_salt;
use crate::protocol::mysql::codes::{ER_ACCESS_DENIED_ERROR, ER_DBACCESS_DENIED_ERROR};
use crate::protocol::mysql::{
    ServerError, DEFAULT_COLLATION_ID, DEFAULT_SERVER_CAPABILITIES, SALT_LEN,
    SERVER_STATUS_AUTOCOMMIT,
};
use crate::server::{IdentityFactory, ServerIdentity};

/// Greeting values shared by every connection
#[derive(Debug, Clone)]
pub struct IdentitySettings {
    pub server_version: Vec<u8>,
    pub collation: u8,
    pub status_flags: u16,
    /// Capabilities offered in the greeting
    pub capabilities: u32,
    pub default_database: String,
}

impl Default for IdentitySettings {
    fn default() -> Self {
        Self {
            server_version: concat!("5.7.44-mysql-handshake-", env!("CARGO_PKG_VERSION"))
                .as_bytes()
                .to_vec(),
            collation: DEFAULT_COLLATION_ID,
            status_flags: SERVER_STATUS_AUTOCOMMIT,
            capabilities: DEFAULT_SERVER_CAPABILITIES,
            default_database: String::new(),
        }
    }
}

/// Source of per-connection [`StaticIdentity`] values.
pub struct StaticAuthority {
    settings: Arc<IdentitySettings>,
    accounts: Arc<HashMap<String, UserAccount>>,
    next_connection_id: AtomicU32,
}

impl StaticAuthority {
    pub fn new(settings: IdentitySettings, accounts: impl IntoIterator<Item = UserAccount>) -> Self {
        let accounts = accounts
            .into_iter()
            .map(|account| (account.username().to_string(), account))
            .collect();

        Self {
            settings: Arc::new(settings),
            accounts: Arc::new(accounts),
            next_connection_id: AtomicU32::new(1),
        }
    }

    /// Build from a validated [`Config`].
    ///
    /// Passwords are hashed here; the plain-text copies stay in the config.
    pub fn from_config(config: &Config) -> Self {
        let settings = IdentitySettings {
            server_version: config.identity.server_version.as_bytes().to_vec(),
            collation: config.identity.collation_id,
            status_flags: config.identity.status_flags,
            capabilities: config.identity.capabilities,
            default_database: config.identity.default_database.clone(),
        };

        let accounts = config.users.iter().map(|user| {
            UserAccount::new(user.username.clone(), &user.password)
                .with_databases(user.databases.iter().cloned())
        });

        let authority = Self::new(settings, accounts);
        info!("Loaded {} user account(s)", authority.accounts.len());
        authority
    }

    pub fn settings(&self) -> &IdentitySettings {
        &self.settings
    }

    pub fn account(&self, username: &str) -> Option<&UserAccount> {
        self.accounts.get(username)
    }

    /// Next connection id. Never 0; wraps after `u32::MAX`.
    pub fn next_connection_id(&self) -> u32 {
        loop {
            let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                return id;
            }
        }
    }

    /// Fresh identity for one connection
    pub fn identity(&self, peer: Option<SocketAddr>) -> StaticIdentity {
        StaticIdentity {
            connection_id: self.next_connection_id(),
            salt: generate_salt(),
            capabilities: self.settings.capabilities,
            settings: Arc::clone(&self.settings),
            accounts: Arc::clone(&self.accounts),
            host: peer
                .map(|addr| addr.ip().to_string())
                .unwrap_or_else(|| "localhost".to_string()),
        }
    }
}

impl IdentityFactory for StaticAuthority {
    type Identity = StaticIdentity;

    fn identity_for(&self, peer: Option<SocketAddr>) -> StaticIdentity {
        self.identity(peer)
    }
}

/// Identity of one connection, handed out by [`StaticAuthority`].
pub struct StaticIdentity {
    connection_id: u32,
    salt: [u8; SALT_LEN],
    capabilities: u32,
    settings: Arc<IdentitySettings>,
    accounts: Arc<HashMap<String, UserAccount>>,
    host: String,
}

impl StaticIdentity {
    /// Peer host as used in error messages
    pub fn host(&self) -> &str {
        &self.host
    }

    fn access_denied(&self, user: &str, auth_response: &[u8]) -> ServerError {
        let using_password = if auth_response.is_empty() { "NO" } else { "YES" };
        ServerError::new(ER_ACCESS_DENIED_ERROR, &[&user, &self.host, &using_password])
    }

    fn database_denied(&self, user: &str, database: &str) -> ServerError {
        ServerError::new(ER_DBACCESS_DENIED_ERROR, &[&user, &self.host, &database])
    }
}

#[async_trait]
impl ServerIdentity for StaticIdentity {
    fn connection_id(&self) -> u32 {
        self.connection_id
    }

    fn salt(&self) -> &[u8] {
        &self.salt
    }

    fn collation(&self) -> u8 {
        self.settings.collation
    }

    fn status_flags(&self) -> u16 {
        self.settings.status_flags
    }

    fn capabilities(&self) -> u32 {
        self.capabilities
    }

    fn set_capabilities(&mut self, capabilities: u32) {
        self.capabilities = capabilities;
    }

    fn server_version(&self) -> &[u8] {
        &self.settings.server_version
    }

    fn default_database(&self) -> &str {
        &self.settings.default_database
    }

    async fn check_auth(&self, user: &str, auth_response: &[u8], database: &str) -> Result<()> {
        let Some(account) = self.accounts.get(user) else {
            debug!(conn_id = self.connection_id, user, "Unknown user");
            return Err(self.access_denied(user, auth_response).into());
        };

        if !account.verify(auth_response, &self.salt) {
            debug!(conn_id = self.connection_id, user, "Password mismatch");
            return Err(self.access_denied(user, auth_response).into());
        }

        if !account.may_use_database(database) {
            debug!(conn_id = self.connection_id, user, database, "Database not allowed");
            return Err(self.database_denied(user, database).into());
        }

        Ok(())
    }

    async fn check_database(&self, user: &str, database: &str) -> Result<()> {
        match self.accounts.get(user) {
            Some(account) if account.may_use_database(database) => Ok(()),
            _ => Err(self.database_denied(user, database).into()),
        }
    }
}
