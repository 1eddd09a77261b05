//! Login accounts.

use std::fmt;

use zeroize::{ZeroizeOnDrop, Zeroizing};

use crate::protocol::mysql::auth::{hash_password, verify_auth_response};

/// An account the server accepts.
///
/// Only `SHA1(SHA1(password))` is kept, never the password itself, and it is
/// zeroed on drop.
///
/// ```
/// use mysql_handshake::auth::UserAccount;
/// use mysql_handshake::protocol::mysql::auth::compute_auth_response;
///
/// let account = UserAccount::new("app", "s3cret").with_databases(["orders"]);
/// let salt = [7u8; 20];
///
/// assert!(account.verify(&compute_auth_response("s3cret", &salt), &salt));
/// assert!(account.may_use_database("orders"));
/// assert!(!account.may_use_database("billing"));
/// ```
#[derive(Clone, ZeroizeOnDrop)]
pub struct UserAccount {
    #[zeroize(skip)]
    username: String,
    /// None for accounts with an empty password
    password_hash: Option<Zeroizing<[u8; 20]>>,
    /// Empty means any database
    #[zeroize(skip)]
    databases: Vec<String>,
}

impl UserAccount {
    pub fn new(username: impl Into<String>, password: &str) -> Self {
        let password_hash = if password.is_empty() {
            None
        } else {
            Some(Zeroizing::new(hash_password(password)))
        };

        Self {
            username: username.into(),
            password_hash,
            databases: Vec::new(),
        }
    }

    /// Restrict the account to the given databases
    pub fn with_databases<I, S>(mut self, databases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.databases = databases.into_iter().map(Into::into).collect();
        self
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn has_password(&self) -> bool {
        self.password_hash.is_some()
    }

    /// Check a mysql_native_password response against this account.
    ///
    /// Accounts without a password only accept an empty response.
    pub fn verify(&self, auth_response: &[u8], salt: &[u8]) -> bool {
        match &self.password_hash {
            Some(hash) => verify_auth_response(auth_response, salt, hash),
            None => auth_response.is_empty(),
        }
    }

    /// True when `database` is empty or allowed for this account.
    pub fn may_use_database(&self, database: &str) -> bool {
        database.is_empty()
            || self.databases.is_empty()
            || self.databases.iter().any(|d| d == database)
    }
}

impl fmt::Debug for UserAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserAccount")
            .field("username", &self.username)
            .field(
                "password_hash",
                &self.password_hash.as_ref().map(|_| "[REDACTED]"),
            )
            .field("databases", &self.databases)
            .finish()
    }
}
