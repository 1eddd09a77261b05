//! Configuration loader

use super::Config;
use crate::error::{HandshakeError, Result};
use std::path::Path;

/// Load configuration from a YAML file
///
/// Also applies MYSQL_HANDSHAKE_* env var overrides after loading.
pub fn load_config(path: &Path) -> Result<Config> {
    let contents = std::fs::read_to_string(path)?;
    load_config_from_str(&contents)
}

/// Load configuration from a YAML string (useful for testing)
///
/// Also applies MYSQL_HANDSHAKE_* env var overrides after loading.
pub fn load_config_from_str(yaml: &str) -> Result<Config> {
    let mut config: Config = serde_yaml::from_str(yaml)?;
    resolve_config_env_vars(&mut config);
    apply_env_overrides(&mut config);
    config.validate().map_err(HandshakeError::Config)?;
    Ok(config)
}

/// Apply MYSQL_HANDSHAKE_* environment variable overrides to a config.
///
/// Supported env vars:
/// - `MYSQL_HANDSHAKE_LISTEN_ADDRESS` - Override listen address
/// - `MYSQL_HANDSHAKE_LISTEN_PORT` - Override listen port
/// - `MYSQL_HANDSHAKE_LOG_LEVEL` - Override log level
/// - `MYSQL_HANDSHAKE_HANDSHAKE_TIMEOUT_SECS` - Override handshake timeout
/// - `MYSQL_HANDSHAKE_MAX_CONNECTIONS` - Override max connections
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(config: &mut Config) {
    if let Ok(val) = std::env::var("MYSQL_HANDSHAKE_LISTEN_ADDRESS") {
        debug!("Overriding listen_address from MYSQL_HANDSHAKE_LISTEN_ADDRESS");
        config.server.listen_address = val;
    }
    if let Ok(val) = std::env::var("MYSQL_HANDSHAKE_LISTEN_PORT") {
        if let Ok(port) = val.parse::<u16>() {
            debug!("Overriding listen_port from MYSQL_HANDSHAKE_LISTEN_PORT");
            config.server.listen_port = port;
        }
    }
    if let Ok(val) = std::env::var("MYSQL_HANDSHAKE_LOG_LEVEL") {
        debug!("Overriding log level from MYSQL_HANDSHAKE_LOG_LEVEL");
        config.logging.level = val;
    }
    if let Ok(val) = std::env::var("MYSQL_HANDSHAKE_HANDSHAKE_TIMEOUT_SECS") {
        if let Ok(secs) = val.parse::<u64>() {
            debug!("Overriding handshake_timeout from MYSQL_HANDSHAKE_HANDSHAKE_TIMEOUT_SECS");
            config.server.handshake_timeout_secs = secs;
        }
    }
    if let Ok(val) = std::env::var("MYSQL_HANDSHAKE_MAX_CONNECTIONS") {
        if let Ok(max) = val.parse::<usize>() {
            debug!("Overriding max_connections from MYSQL_HANDSHAKE_MAX_CONNECTIONS");
            config.server.max_connections = max;
        }
    }
}

/// Resolve environment variables in a string value
///
/// Supports two syntaxes:
/// - `${VAR_NAME}` - curly brace syntax
/// - `$VAR_NAME` - simple syntax (for single variable values)
///
/// If the environment variable is not set, the original value is preserved.
fn resolve_env_var(value: &str) -> String {
    let var_name = if let Some(name) = value
        .strip_prefix("${")
        .and_then(|rest| rest.strip_suffix('}'))
    {
        name
    } else if let Some(name) = value.strip_prefix('$') {
        if name.is_empty() || name.contains(' ') {
            return value.to_string();
        }
        name
    } else {
        return value.to_string();
    };

    match std::env::var(var_name) {
        Ok(env_value) => {
            debug!("Resolved env var {} from config", var_name);
            env_value
        }
        Err(_) => {
            debug!("Env var {} not set, keeping original value", var_name);
            value.to_string()
        }
    }
}

/// Resolve environment variables in all config fields that support it
fn resolve_config_env_vars(config: &mut Config) {
    for user in &mut config.users {
        user.username = resolve_env_var(&user.username);
        user.password = resolve_env_var(&user.password);
    }
    config.identity.default_database = resolve_env_var(&config.identity.default_database);
}
