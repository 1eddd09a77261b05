//! Configuration module for mysql-handshake
//!
//! ```yaml
//! server:
//!   listen_address: "0.0.0.0"
//!   listen_port: 3306
//!   handshake_timeout_secs: 10
//!   max_connections: 500
//!
//! identity:
//!   server_version: "5.7.44"
//!   collation_id: 33
//!   default_database: app
//!
//! users:
//!   - username: root
//!     password: "${MYSQL_ROOT_PASSWORD}"
//!
//! logging:
//!   level: debug
//! ```

mod loader;
mod types;

pub use loader::{apply_env_overrides, load_config, load_config_from_str};
pub use types::*;
