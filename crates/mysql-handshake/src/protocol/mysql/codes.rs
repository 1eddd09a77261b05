//! MySQL server error codes, their SQL states and message templates.
//!
//! The tables are plain `static` data: built at compile time, never mutated,
//! and safe to read from any number of connections at once.
//! Reference: <https://dev.mysql.com/doc/mysql-errors/8.0/en/server-error-reference.html>

/// SQL state used when a code has no registered mapping.
pub const DEFAULT_SQL_STATE: &str = "HY000";

pub const ER_CON_COUNT_ERROR: u16 = 1040;
pub const ER_HANDSHAKE_ERROR: u16 = 1043;
pub const ER_DBACCESS_DENIED_ERROR: u16 = 1044;
pub const ER_ACCESS_DENIED_ERROR: u16 = 1045;
pub const ER_NO_DB_ERROR: u16 = 1046;
pub const ER_UNKNOWN_COM_ERROR: u16 = 1047;
pub const ER_BAD_DB_ERROR: u16 = 1049;
pub const ER_SERVER_SHUTDOWN: u16 = 1053;
pub const ER_PARSE_ERROR: u16 = 1064;
pub const ER_UNKNOWN_ERROR: u16 = 1105;
pub const ER_HOST_IS_BLOCKED: u16 = 1129;
pub const ER_HOST_NOT_PRIVILEGED: u16 = 1130;
pub const ER_ABORTING_CONNECTION: u16 = 1152;
pub const ER_NET_PACKET_TOO_LARGE: u16 = 1153;
pub const ER_NET_READ_ERROR_FROM_PIPE: u16 = 1154;
pub const ER_NET_PACKETS_OUT_OF_ORDER: u16 = 1156;
pub const ER_NET_UNCOMPRESS_ERROR: u16 = 1157;
pub const ER_NET_READ_ERROR: u16 = 1158;
pub const ER_NET_READ_INTERRUPTED: u16 = 1159;
pub const ER_NET_ERROR_ON_WRITE: u16 = 1160;
pub const ER_NET_WRITE_INTERRUPTED: u16 = 1161;
pub const ER_NEW_ABORTING_CONNECTION: u16 = 1184;
pub const ER_TOO_MANY_USER_CONNECTIONS: u16 = 1203;
pub const ER_USER_LIMIT_REACHED: u16 = 1226;
pub const ER_SPECIFIC_ACCESS_DENIED_ERROR: u16 = 1227;
pub const ER_NOT_SUPPORTED_YET: u16 = 1235;
pub const ER_NOT_SUPPORTED_AUTH_MODE: u16 = 1251;
pub const ER_MUST_CHANGE_PASSWORD: u16 = 1820;
pub const ER_MALFORMED_PACKET: u16 = 1835;
pub const ER_MUST_CHANGE_PASSWORD_LOGIN: u16 = 1862;

/// Error code -> SQL state. Sorted by code.
static SQL_STATES: &[(u16, &str)] = &[
    (ER_CON_COUNT_ERROR, "08004"),
    (ER_HANDSHAKE_ERROR, "08S01"),
    (ER_DBACCESS_DENIED_ERROR, "42000"),
    (ER_ACCESS_DENIED_ERROR, "28000"),
    (ER_NO_DB_ERROR, "3D000"),
    (ER_UNKNOWN_COM_ERROR, "08S01"),
    (ER_BAD_DB_ERROR, "42000"),
    (ER_SERVER_SHUTDOWN, "08S01"),
    (ER_PARSE_ERROR, "42000"),
    (ER_UNKNOWN_ERROR, "HY000"),
    (ER_HOST_IS_BLOCKED, "HY000"),
    (ER_HOST_NOT_PRIVILEGED, "HY000"),
    (ER_ABORTING_CONNECTION, "08S01"),
    (ER_NET_PACKET_TOO_LARGE, "08S01"),
    (ER_NET_READ_ERROR_FROM_PIPE, "08S01"),
    (ER_NET_PACKETS_OUT_OF_ORDER, "08S01"),
    (ER_NET_UNCOMPRESS_ERROR, "08S01"),
    (ER_NET_READ_ERROR, "08S01"),
    (ER_NET_READ_INTERRUPTED, "08S01"),
    (ER_NET_ERROR_ON_WRITE, "08S01"),
    (ER_NET_WRITE_INTERRUPTED, "08S01"),
    (ER_NEW_ABORTING_CONNECTION, "08S01"),
    (ER_TOO_MANY_USER_CONNECTIONS, "42000"),
    (ER_USER_LIMIT_REACHED, "42000"),
    (ER_SPECIFIC_ACCESS_DENIED_ERROR, "42000"),
    (ER_NOT_SUPPORTED_YET, "42000"),
    (ER_NOT_SUPPORTED_AUTH_MODE, "08004"),
    (ER_MUST_CHANGE_PASSWORD, "HY000"),
    (ER_MALFORMED_PACKET, "HY000"),
    (ER_MUST_CHANGE_PASSWORD_LOGIN, "HY000"),
];

/// Error code -> printf-style message template. Sorted by code.
///
/// `ER_UNKNOWN_ERROR` is left out on purpose: its arguments (usually the
/// text of a foreign error) become the message verbatim.
static MESSAGE_TEMPLATES: &[(u16, &str)] = &[
    (ER_CON_COUNT_ERROR, "Too many connections"),
    (ER_HANDSHAKE_ERROR, "Bad handshake"),
    (
        ER_DBACCESS_DENIED_ERROR,
        "Access denied for user '%-.48s'@'%-.64s' to database '%-.192s'",
    ),
    (
        ER_ACCESS_DENIED_ERROR,
        "Access denied for user '%-.48s'@'%-.64s' (using password: %s)",
    ),
    (ER_NO_DB_ERROR, "No database selected"),
    (ER_UNKNOWN_COM_ERROR, "Unknown command"),
    (ER_BAD_DB_ERROR, "Unknown database '%-.192s'"),
    (ER_SERVER_SHUTDOWN, "Server shutdown in progress"),
    (ER_PARSE_ERROR, "%s near '%-.80s' at line %d"),
    (
        ER_HOST_IS_BLOCKED,
        "Host '%-.64s' is blocked because of many connection errors; unblock with 'mysqladmin flush-hosts'",
    ),
    (
        ER_HOST_NOT_PRIVILEGED,
        "Host '%-.64s' is not allowed to connect to this MySQL server",
    ),
    (
        ER_ABORTING_CONNECTION,
        "Aborted connection %ld to db: '%-.192s' user: '%-.48s' (%-.64s)",
    ),
    (
        ER_NET_PACKET_TOO_LARGE,
        "Got a packet bigger than 'max_allowed_packet' bytes",
    ),
    (
        ER_NET_READ_ERROR_FROM_PIPE,
        "Got a read error from the connection pipe",
    ),
    (ER_NET_PACKETS_OUT_OF_ORDER, "Got packets out of order"),
    (
        ER_NET_UNCOMPRESS_ERROR,
        "Couldn't uncompress communication packet",
    ),
    (ER_NET_READ_ERROR, "Got an error reading communication packets"),
    (ER_NET_READ_INTERRUPTED, "Got timeout reading communication packets"),
    (ER_NET_ERROR_ON_WRITE, "Got an error writing communication packets"),
    (
        ER_NET_WRITE_INTERRUPTED,
        "Got timeout writing communication packets",
    ),
    (
        ER_NEW_ABORTING_CONNECTION,
        "Aborted connection %u to db: '%-.192s' user: '%-.48s' host: '%-.64s' (%-.64s)",
    ),
    (
        ER_TOO_MANY_USER_CONNECTIONS,
        "User %-.64s already has more than 'max_user_connections' active connections",
    ),
    (
        ER_USER_LIMIT_REACHED,
        "User '%-.64s' has exceeded the '%s' resource (current value: %ld)",
    ),
    (
        ER_SPECIFIC_ACCESS_DENIED_ERROR,
        "Access denied; you need (at least one of) the %-.128s privilege(s) for this operation",
    ),
    (
        ER_NOT_SUPPORTED_YET,
        "This version of MySQL doesn't yet support '%s'",
    ),
    (
        ER_NOT_SUPPORTED_AUTH_MODE,
        "Client does not support authentication protocol requested by server; consider upgrading MySQL client",
    ),
    (
        ER_MUST_CHANGE_PASSWORD,
        "You must reset your password using ALTER USER statement before executing this statement.",
    ),
    (ER_MALFORMED_PACKET, "Malformed communication packet."),
    (
        ER_MUST_CHANGE_PASSWORD_LOGIN,
        "Your password has expired. To log in you must change it using a client that supports expired passwords.",
    ),
];

fn lookup(table: &'static [(u16, &'static str)], code: u16) -> Option<&'static str> {
    table
        .binary_search_by_key(&code, |&(c, _)| c)
        .ok()
        .map(|idx| table[idx].1)
}

/// SQL state registered for `code`, if any.
pub fn sql_state(code: u16) -> Option<&'static str> {
    lookup(SQL_STATES, code)
}

/// Message template registered for `code`, if any.
pub fn message_template(code: u16) -> Option<&'static str> {
    lookup(MESSAGE_TEMPLATES, code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_are_sorted() {
        // binary search depends on it
        assert!(SQL_STATES.windows(2).all(|w| w[0].0 < w[1].0));
        assert!(MESSAGE_TEMPLATES.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn test_states_are_five_chars() {
        for (code, state) in SQL_STATES {
            assert_eq!(state.len(), 5, "bad state for {}", code);
        }
        assert_eq!(DEFAULT_SQL_STATE.len(), 5);
    }

    #[test]
    fn test_access_denied_mapping() {
        assert_eq!(sql_state(ER_ACCESS_DENIED_ERROR), Some("28000"));
        assert!(message_template(ER_ACCESS_DENIED_ERROR)
            .unwrap()
            .starts_with("Access denied for user"));
    }

    #[test]
    fn test_unknown_code_lookup() {
        assert_eq!(sql_state(9999), None);
        assert_eq!(message_template(9999), None);
        // registered state, but no template
        assert_eq!(sql_state(ER_UNKNOWN_ERROR), Some("HY000"));
        assert_eq!(message_template(ER_UNKNOWN_ERROR), None);
    }
}
