//! MySQL connection-phase packet encoding and decoding.
//!
//! Payloads only: framing (length + sequence header) is the transport's job,
//! see [`PacketStream`](crate::server::PacketStream).
//! Reference: <https://dev.mysql.com/doc/dev/mysql-server/latest/page_protocol_connection_phase_packets.html>

use super::codes::{ER_ACCESS_DENIED_ERROR, ER_HANDSHAKE_ERROR};
use super::packets::*;
use super::server_error::ServerError;
use crate::error::{HandshakeError, Result};

/// Size of an SSL request packet: the fixed part of a HandshakeResponse41
const SSL_REQUEST_LEN: usize = 32;

// ============================================================================
// Greeting
// ============================================================================

/// Build a Protocol::HandshakeV10 payload.
///
/// Layout: version `10`, server version + NUL, connection id (4 LE), salt
/// part 1 (8), filler, capabilities low 16 bits, collation, status flags,
/// capabilities high 16 bits, filler, 10 reserved zeros, salt part 2 (12),
/// trailing NUL.
///
/// # Panics
///
/// If the greeting's salt is not exactly [`SALT_LEN`] bytes. That is a bug in
/// the identity, not something a client can trigger.
pub fn build_greeting(greeting: &Greeting) -> Vec<u8> {
    assert_eq!(
        greeting.salt.len(),
        SALT_LEN,
        "greeting salt must be {} bytes",
        SALT_LEN
    );
    debug_assert!(!greeting.server_version.contains(&0));

    let mut payload = Vec::with_capacity(64 + greeting.server_version.len());

    payload.push(PROTOCOL_VERSION);

    payload.extend_from_slice(&greeting.server_version);
    payload.push(0);

    payload.extend_from_slice(&greeting.connection_id.to_le_bytes());

    payload.extend_from_slice(&greeting.salt[..SALT_PART1_LEN]);
    payload.push(0);

    let caps = greeting.capability_flags.to_le_bytes();
    payload.extend_from_slice(&caps[..2]);

    payload.push(greeting.collation);
    payload.extend_from_slice(&greeting.status_flags.to_le_bytes());

    payload.extend_from_slice(&caps[2..]);

    // auth-plugin-data length; zero because CLIENT_PLUGIN_AUTH is not offered
    payload.push(0);
    payload.extend_from_slice(&[0u8; 10]);

    payload.extend_from_slice(&greeting.salt[SALT_PART1_LEN..]);
    payload.push(0);

    payload
}

/// Parse a HandshakeV10 payload produced by [`build_greeting`].
///
/// This is the client's view of the greeting; the server never reads one,
/// but it keeps the layout honest in tests and tools.
pub fn parse_greeting(payload: &[u8]) -> Result<Greeting> {
    let mut cursor = 0;

    let version = *payload
        .first()
        .ok_or_else(|| HandshakeError::Protocol("Empty greeting packet".into()))?;
    if version != PROTOCOL_VERSION {
        return Err(HandshakeError::Protocol(format!(
            "Unsupported protocol version: {}",
            version
        )));
    }
    cursor += 1;

    let (server_version, bytes_read) = read_null_terminated(&payload[cursor..])?;
    cursor += bytes_read;

    let connection_id = read_u32_le(&payload[cursor..])?;
    cursor += 4;

    let mut salt = take(payload, cursor, SALT_PART1_LEN)?.to_vec();
    cursor += SALT_PART1_LEN + 1;

    let caps_lower = read_u16_le(payload.get(cursor..).unwrap_or_default())?;
    cursor += 2;

    let collation = take(payload, cursor, 1)?[0];
    cursor += 1;

    let status_flags = read_u16_le(payload.get(cursor..).unwrap_or_default())?;
    cursor += 2;

    let caps_upper = read_u16_le(payload.get(cursor..).unwrap_or_default())?;
    cursor += 2;

    // plugin data length + reserved
    cursor += 11;

    salt.extend_from_slice(take(payload, cursor, SALT_LEN - SALT_PART1_LEN)?);

    Ok(Greeting {
        server_version: server_version.to_vec(),
        connection_id,
        salt,
        capability_flags: (caps_upper as u32) << 16 | caps_lower as u32,
        collation,
        status_flags,
    })
}

// ============================================================================
// Handshake Response
// ============================================================================

/// Parse the client's handshake response.
///
/// The client's own capability flags decide the layout: protocol-41 clients
/// send HandshakeResponse41, older ones HandshakeResponse320. `host` is the
/// peer host, used only to word the access-denied error.
///
/// # Errors
///
/// * [`HandshakeError::Protocol`] on truncated or malformed input
/// * [`HandshakeError::Server`] with `ER_ACCESS_DENIED_ERROR` when
///   CLIENT_CONNECT_WITH_DB is set but nothing follows the auth response
/// * [`HandshakeError::Server`] with `ER_HANDSHAKE_ERROR` for an SSL request
pub fn parse_handshake_response(payload: &[u8], host: &str) -> Result<HandshakeResponse> {
    let flags_lower = read_u16_le(payload)? as u32;
    let decoded = if flags_lower & CLIENT_PROTOCOL_41 != 0 {
        parse_response41(payload)?
    } else {
        parse_response320(payload)?
    };

    match decoded {
        Decoded::Response(response) => Ok(response),
        Decoded::SslRequest => Err(ServerError::new(ER_HANDSHAKE_ERROR, &[]).into()),
        Decoded::MissingDatabase {
            username,
            has_password,
        } => {
            let using_password = if has_password { "YES" } else { "NO" };
            Err(ServerError::new(
                ER_ACCESS_DENIED_ERROR,
                &[&username, &host, &using_password],
            )
            .into())
        }
    }
}

/// Outcome of decoding, before policy is applied
enum Decoded {
    Response(HandshakeResponse),
    SslRequest,
    /// CLIENT_CONNECT_WITH_DB set, but the packet ends after the auth response
    MissingDatabase { username: String, has_password: bool },
}

fn parse_response41(payload: &[u8]) -> Result<Decoded> {
    let mut cursor = 0;

    let capability_flags = read_u32_le(payload)?;
    cursor += 4;

    if capability_flags & CLIENT_SSL != 0 && payload.len() == SSL_REQUEST_LEN {
        warn!(
            capability_flags = format_args!("0x{:08X}", capability_flags),
            "Client requested SSL, which this server does not offer"
        );
        return Ok(Decoded::SslRequest);
    }

    let max_packet_size = read_u32_le(&payload[cursor..])?;
    cursor += 4;

    let character_set = take(payload, cursor, 1)?[0];
    cursor += 1;

    // reserved
    take(payload, cursor, 23)?;
    cursor += 23;

    let (username, bytes_read) = read_null_terminated(&payload[cursor..])?;
    let username = String::from_utf8_lossy(username).into_owned();
    cursor += bytes_read;

    let auth_response = if capability_flags & CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA != 0 {
        let (len, len_bytes) = read_length_encoded_int(&payload[cursor..])?;
        cursor += len_bytes;
        let len = usize::try_from(len)
            .map_err(|_| HandshakeError::Protocol("Auth response too long".into()))?;
        let data = take(payload, cursor, len)?.to_vec();
        cursor += len;
        data
    } else if capability_flags & CLIENT_SECURE_CONNECTION != 0 {
        let len = take(payload, cursor, 1)?[0] as usize;
        cursor += 1;
        let data = take(payload, cursor, len)?.to_vec();
        cursor += len;
        data
    } else {
        let (data, bytes_read) = read_null_terminated(&payload[cursor..])?;
        cursor += bytes_read;
        data.to_vec()
    };

    let database = if capability_flags & CLIENT_CONNECT_WITH_DB != 0 {
        if cursor >= payload.len() {
            return Ok(Decoded::MissingDatabase {
                username,
                has_password: !auth_response.is_empty(),
            });
        }
        let (db, bytes_read) = read_null_terminated(&payload[cursor..])?;
        cursor += bytes_read;
        Some(String::from_utf8_lossy(db).into_owned())
    } else {
        None
    };

    // Some clients omit the terminator on the last field
    let auth_plugin_name = if capability_flags & CLIENT_PLUGIN_AUTH != 0 && cursor < payload.len()
    {
        let rest = &payload[cursor..];
        let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
        Some(String::from_utf8_lossy(&rest[..end]).into_owned())
    } else {
        None
    };

    trace!(
        username = %username,
        capability_flags = format_args!("0x{:08X}", capability_flags),
        auth_len = auth_response.len(),
        "Parsed HandshakeResponse41"
    );

    Ok(Decoded::Response(HandshakeResponse {
        capability_flags,
        max_packet_size,
        character_set,
        username,
        auth_response,
        database,
        auth_plugin_name,
    }))
}

/// Pre-4.1 layout: 2-byte flags, 3-byte max packet size, user, auth, [db].
fn parse_response320(payload: &[u8]) -> Result<Decoded> {
    let mut cursor = 0;

    let capability_flags = read_u16_le(payload)? as u32;
    cursor += 2;

    let size = take(payload, cursor, 3)?;
    let max_packet_size = u32::from_le_bytes([size[0], size[1], size[2], 0]);
    cursor += 3;

    let (username, bytes_read) = read_null_terminated(&payload[cursor..])?;
    let username = String::from_utf8_lossy(username).into_owned();
    cursor += bytes_read;

    let (auth_response, database) = if capability_flags & CLIENT_CONNECT_WITH_DB != 0 {
        let (auth, bytes_read) = read_null_terminated(&payload[cursor..])?;
        cursor += bytes_read;
        if cursor >= payload.len() {
            return Ok(Decoded::MissingDatabase {
                username,
                has_password: !auth.is_empty(),
            });
        }
        let (db, _) = read_null_terminated(&payload[cursor..])?;
        (auth.to_vec(), Some(String::from_utf8_lossy(db).into_owned()))
    } else {
        // auth runs to the end of the packet, terminator optional
        let rest = &payload[cursor..];
        let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
        (rest[..end].to_vec(), None)
    };

    trace!(
        username = %username,
        capability_flags = format_args!("0x{:04X}", capability_flags),
        "Parsed HandshakeResponse320"
    );

    Ok(Decoded::Response(HandshakeResponse {
        capability_flags,
        max_packet_size,
        character_set: 0,
        username,
        auth_response,
        database,
        auth_plugin_name: None,
    }))
}

/// Build a handshake response payload (client side).
///
/// Mirrors [`parse_handshake_response`]; used by tests and tooling that
/// play the client.
pub fn build_handshake_response(response: &HandshakeResponse) -> Vec<u8> {
    let flags = response.capability_flags;
    let mut payload = Vec::with_capacity(64 + response.auth_response.len());

    if flags & CLIENT_PROTOCOL_41 == 0 {
        payload.extend_from_slice(&(flags as u16).to_le_bytes());
        payload.extend_from_slice(&response.max_packet_size.to_le_bytes()[..3]);
        payload.extend_from_slice(response.username.as_bytes());
        payload.push(0);
        payload.extend_from_slice(&response.auth_response);
        if flags & CLIENT_CONNECT_WITH_DB != 0 {
            payload.push(0);
            if let Some(ref db) = response.database {
                payload.extend_from_slice(db.as_bytes());
                payload.push(0);
            }
        }
        return payload;
    }

    payload.extend_from_slice(&flags.to_le_bytes());
    payload.extend_from_slice(&response.max_packet_size.to_le_bytes());
    payload.push(response.character_set);
    payload.extend_from_slice(&[0u8; 23]);

    payload.extend_from_slice(response.username.as_bytes());
    payload.push(0);

    if flags & CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA != 0 {
        write_length_encoded_int(&mut payload, response.auth_response.len() as u64);
        payload.extend_from_slice(&response.auth_response);
    } else if flags & CLIENT_SECURE_CONNECTION != 0 {
        payload.push(response.auth_response.len() as u8);
        payload.extend_from_slice(&response.auth_response);
    } else {
        payload.extend_from_slice(&response.auth_response);
        payload.push(0);
    }

    if flags & CLIENT_CONNECT_WITH_DB != 0 {
        if let Some(ref db) = response.database {
            payload.extend_from_slice(db.as_bytes());
            payload.push(0);
        }
    }

    if flags & CLIENT_PLUGIN_AUTH != 0 {
        if let Some(ref name) = response.auth_plugin_name {
            payload.extend_from_slice(name.as_bytes());
            payload.push(0);
        }
    }

    payload
}

// ============================================================================
// OK / ERR
// ============================================================================

/// Build an OK packet payload.
///
/// Status flags and warnings are only written when `capabilities` include
/// CLIENT_PROTOCOL_41.
pub fn build_ok_packet(ok: &OkResult, capabilities: u32) -> Vec<u8> {
    let mut payload = Vec::with_capacity(16);

    payload.push(OK_HEADER);
    write_length_encoded_int(&mut payload, ok.affected_rows);
    write_length_encoded_int(&mut payload, ok.last_insert_id);

    if capabilities & CLIENT_PROTOCOL_41 != 0 {
        payload.extend_from_slice(&ok.status_flags.to_le_bytes());
        payload.extend_from_slice(&ok.warnings.to_le_bytes());
    }

    payload
}

/// Build an ERR packet payload.
///
/// With CLIENT_PROTOCOL_41 the error number is followed by `#` and the
/// five character SQL state; the message always runs to the end.
pub fn build_err_packet(err: &ServerError, capabilities: u32) -> Vec<u8> {
    let mut payload = Vec::with_capacity(9 + err.message().len());

    payload.push(ERR_HEADER);
    payload.extend_from_slice(&err.number().to_le_bytes());

    if capabilities & CLIENT_PROTOCOL_41 != 0 {
        payload.push(SQL_STATE_MARKER);
        let mut state = [b'0'; 5];
        for (dst, src) in state.iter_mut().zip(err.state().bytes()) {
            *dst = src;
        }
        payload.extend_from_slice(&state);
    }

    payload.extend_from_slice(err.message().as_bytes());

    payload
}

/// Check if a payload is an OK packet
pub fn is_ok_packet(payload: &[u8]) -> bool {
    payload.first() == Some(&OK_HEADER)
}

/// Check if a payload is an ERR packet
pub fn is_err_packet(payload: &[u8]) -> bool {
    payload.first() == Some(&ERR_HEADER)
}

// ============================================================================
// Helper Functions - Reading
// ============================================================================

/// `len` bytes at `pos`, or a truncation error
fn take(data: &[u8], pos: usize, len: usize) -> Result<&[u8]> {
    pos.checked_add(len)
        .and_then(|end| data.get(pos..end))
        .ok_or_else(|| {
            HandshakeError::Protocol(format!(
                "Packet truncated: need {} bytes at offset {}, have {}",
                len,
                pos,
                data.len()
            ))
        })
}

/// Read a NUL-terminated byte string.
/// Returns the bytes and the number consumed (including the terminator)
pub fn read_null_terminated(data: &[u8]) -> Result<(&[u8], usize)> {
    let null_pos = data
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| HandshakeError::Protocol("Missing null terminator".into()))?;
    Ok((&data[..null_pos], null_pos + 1))
}

/// Read a little-endian u16
pub fn read_u16_le(data: &[u8]) -> Result<u16> {
    let bytes = take(data, 0, 2)?;
    Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
}

/// Read a little-endian u32
pub fn read_u32_le(data: &[u8]) -> Result<u32> {
    let bytes = take(data, 0, 4)?;
    Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Read a length-encoded integer.
/// Returns the value and the number of bytes consumed
pub fn read_length_encoded_int(data: &[u8]) -> Result<(u64, usize)> {
    let first = *data.first().ok_or_else(|| {
        HandshakeError::Protocol("Empty data for length-encoded int".into())
    })?;

    match first {
        0xFC => {
            let b = take(data, 1, 2)?;
            Ok((u16::from_le_bytes([b[0], b[1]]) as u64, 3))
        }
        0xFD => {
            let b = take(data, 1, 3)?;
            Ok((u32::from_le_bytes([b[0], b[1], b[2], 0]) as u64, 4))
        }
        0xFE => {
            let b = take(data, 1, 8)?;
            let mut buf = [0u8; 8];
            buf.copy_from_slice(b);
            Ok((u64::from_le_bytes(buf), 9))
        }
        // 0xFB is NULL in row data, 0xFF the ERR marker; neither is a length
        0xFB | 0xFF => Err(HandshakeError::Protocol(format!(
            "Invalid length-encoded int marker 0x{:02X}",
            first
        ))),
        n => Ok((n as u64, 1)),
    }
}

// ============================================================================
// Helper Functions - Writing
// ============================================================================

/// Write a length-encoded integer in the narrowest width class
pub fn write_length_encoded_int(buf: &mut Vec<u8>, value: u64) {
    if value < 251 {
        buf.push(value as u8);
    } else if value < 1 << 16 {
        buf.push(0xFC);
        buf.extend_from_slice(&(value as u16).to_le_bytes());
    } else if value < 1 << 24 {
        buf.push(0xFD);
        buf.extend_from_slice(&(value as u32).to_le_bytes()[..3]);
    } else {
        buf.push(0xFE);
        buf.extend_from_slice(&value.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::mysql::codes::*;

    fn salt() -> Vec<u8> {
        (1..=20).collect()
    }

    fn greeting() -> Greeting {
        Greeting {
            server_version: b"5.7.99-handshake".to_vec(),
            connection_id: 0x0A0B_0C0D,
            salt: salt(),
            capability_flags: DEFAULT_SERVER_CAPABILITIES | CLIENT_MULTI_RESULTS,
            collation: 33,
            status_flags: SERVER_STATUS_AUTOCOMMIT,
        }
    }

    fn response41(flags: u32) -> HandshakeResponse {
        HandshakeResponse {
            capability_flags: flags,
            username: "root".to_string(),
            auth_response: vec![0xAA; 20],
            ..HandshakeResponse::default()
        }
    }

    #[test]
    fn test_greeting_layout_offsets() {
        let g = greeting();
        let payload = build_greeting(&g);
        let v = g.server_version.len();

        assert_eq!(payload[0], 10);
        assert_eq!(&payload[1..1 + v], g.server_version.as_slice());
        assert_eq!(payload[1 + v], 0);

        let p = 2 + v;
        assert_eq!(
            u32::from_le_bytes([payload[p], payload[p + 1], payload[p + 2], payload[p + 3]]),
            0x0A0B_0C0D
        );
        assert_eq!(&payload[p + 4..p + 12], &salt()[..8]);
        assert_eq!(payload[p + 12], 0);
        assert_eq!(
            u16::from_le_bytes([payload[p + 13], payload[p + 14]]),
            g.capability_flags as u16
        );
        assert_eq!(payload[p + 15], 33);
        assert_eq!(u16::from_le_bytes([payload[p + 16], payload[p + 17]]), 2);
        assert_eq!(
            u16::from_le_bytes([payload[p + 18], payload[p + 19]]),
            (g.capability_flags >> 16) as u16
        );
        assert_eq!(payload[p + 20], 0);
        assert_eq!(&payload[p + 21..p + 31], &[0u8; 10]);
        assert_eq!(&payload[p + 31..p + 43], &salt()[8..]);
        assert_eq!(payload[p + 43], 0);
        assert_eq!(payload.len(), p + 44);
    }

    #[test]
    fn test_greeting_parses_back() {
        let g = greeting();
        let parsed = parse_greeting(&build_greeting(&g)).unwrap();
        assert_eq!(parsed, g);
    }

    #[test]
    #[should_panic(expected = "greeting salt must be 20 bytes")]
    fn test_greeting_rejects_short_salt() {
        let g = Greeting {
            salt: vec![1; 8],
            ..greeting()
        };
        build_greeting(&g);
    }

    #[test]
    fn test_parse_greeting_rejects_wrong_version() {
        let mut payload = build_greeting(&greeting());
        payload[0] = 9;
        assert!(matches!(
            parse_greeting(&payload),
            Err(HandshakeError::Protocol(_))
        ));
    }

    #[test]
    fn test_response41_without_db() {
        let response = response41(CLIENT_PROTOCOL_41 | CLIENT_SECURE_CONNECTION);
        let payload = build_handshake_response(&response);
        let parsed = parse_handshake_response(&payload, "127.0.0.1").unwrap();

        assert_eq!(parsed.capability_flags, response.capability_flags);
        assert_eq!(parsed.username, "root");
        assert_eq!(parsed.auth_response, vec![0xAA; 20]);
        assert_eq!(parsed.database, None);
        assert_eq!(parsed.max_packet_size, PacketHeader::MAX_PAYLOAD_LENGTH);
        assert_eq!(parsed.character_set, DEFAULT_COLLATION_ID);
    }

    #[test]
    fn test_response41_with_db_and_plugin() {
        let response = HandshakeResponse {
            database: Some("inventory".into()),
            auth_plugin_name: Some("mysql_native_password".into()),
            ..response41(
                CLIENT_PROTOCOL_41
                    | CLIENT_SECURE_CONNECTION
                    | CLIENT_CONNECT_WITH_DB
                    | CLIENT_PLUGIN_AUTH,
            )
        };
        let parsed =
            parse_handshake_response(&build_handshake_response(&response), "h").unwrap();
        assert_eq!(parsed, response);
    }

    #[test]
    fn test_response41_lenenc_auth() {
        let response = HandshakeResponse {
            auth_response: vec![7; 300],
            ..response41(CLIENT_PROTOCOL_41 | CLIENT_PLUGIN_AUTH_LENENC_CLIENT_DATA)
        };
        let parsed =
            parse_handshake_response(&build_handshake_response(&response), "h").unwrap();
        assert_eq!(parsed.auth_response.len(), 300);
    }

    #[test]
    fn test_response41_empty_auth() {
        let response = HandshakeResponse {
            auth_response: Vec::new(),
            ..response41(CLIENT_PROTOCOL_41 | CLIENT_SECURE_CONNECTION)
        };
        let payload = build_handshake_response(&response);
        let parsed = parse_handshake_response(&payload, "h").unwrap();
        assert!(parsed.auth_response.is_empty());
        assert_eq!(parsed.database_or_empty(), "");
    }

    #[test]
    fn test_response41_nul_terminated_auth_with_db() {
        let response = HandshakeResponse {
            auth_response: b"old-style scramble".to_vec(),
            database: Some("inventory".into()),
            ..response41(CLIENT_PROTOCOL_41 | CLIENT_CONNECT_WITH_DB)
        };
        let payload = build_handshake_response(&response);

        // user\0, auth\0, db\0 after the 32-byte fixed part
        let auth_end = 32 + b"root\0".len() + b"old-style scramble".len();
        assert_eq!(payload[auth_end], 0);
        assert_eq!(&payload[auth_end + 1..], b"inventory\0");

        let parsed = parse_handshake_response(&payload, "h").unwrap();
        assert_eq!(parsed, response);
    }

    #[test]
    fn test_response41_nul_terminated_auth_missing_db() {
        let response = HandshakeResponse {
            auth_response: b"scramble".to_vec(),
            ..response41(CLIENT_PROTOCOL_41 | CLIENT_CONNECT_WITH_DB)
        };
        let payload = build_handshake_response(&response);
        let err = parse_handshake_response(&payload, "10.0.0.9").unwrap_err();

        let server_err = err.as_server_error().expect("structured error");
        assert_eq!(server_err.number(), ER_ACCESS_DENIED_ERROR);
        assert_eq!(
            server_err.message(),
            "Access denied for user 'root'@'10.0.0.9' (using password: YES)"
        );
    }

    #[test]
    fn test_response41_nul_terminated_auth_unterminated() {
        let mut payload =
            build_handshake_response(&response41(CLIENT_PROTOCOL_41 | CLIENT_CONNECT_WITH_DB));
        // drop the auth terminator along with the (absent) database
        payload.truncate(payload.len() - 1);
        assert!(matches!(
            parse_handshake_response(&payload, "h"),
            Err(HandshakeError::Protocol(_))
        ));
    }

    #[test]
    fn test_connect_with_db_but_no_db_is_access_denied() {
        let response = response41(
            CLIENT_PROTOCOL_41 | CLIENT_SECURE_CONNECTION | CLIENT_CONNECT_WITH_DB,
        );
        let payload = build_handshake_response(&response);
        let err = parse_handshake_response(&payload, "10.1.2.3").unwrap_err();

        let server_err = err.as_server_error().expect("structured error");
        assert_eq!(server_err.number(), ER_ACCESS_DENIED_ERROR);
        assert_eq!(server_err.state(), "28000");
        assert_eq!(
            server_err.message(),
            "Access denied for user 'root'@'10.1.2.3' (using password: YES)"
        );
    }

    #[test]
    fn test_truncated_responses_are_protocol_errors() {
        let payload = build_handshake_response(&response41(
            CLIENT_PROTOCOL_41 | CLIENT_SECURE_CONNECTION,
        ));
        for len in [0, 1, 3, 8, 20, 32, 34, 40] {
            let err = parse_handshake_response(&payload[..len], "h").unwrap_err();
            assert!(
                matches!(err, HandshakeError::Protocol(_)),
                "len {} gave {:?}",
                len,
                err
            );
        }
    }

    #[test]
    fn test_ssl_request_is_rejected() {
        let mut payload = Vec::new();
        payload.extend_from_slice(&(CLIENT_PROTOCOL_41 | CLIENT_SSL).to_le_bytes());
        payload.extend_from_slice(&PacketHeader::MAX_PAYLOAD_LENGTH.to_le_bytes());
        payload.push(33);
        payload.extend_from_slice(&[0u8; 23]);

        let err = parse_handshake_response(&payload, "h").unwrap_err();
        assert_eq!(err.as_server_error().unwrap().number(), ER_HANDSHAKE_ERROR);
    }

    #[test]
    fn test_response320_roundtrip() {
        let response = HandshakeResponse {
            capability_flags: CLIENT_LONG_PASSWORD | CLIENT_CONNECT_WITH_DB,
            max_packet_size: 0x00FF_FFFF,
            character_set: 0,
            username: "legacy".into(),
            auth_response: b"12345678".to_vec(),
            database: Some("old".into()),
            auth_plugin_name: None,
        };
        let parsed =
            parse_handshake_response(&build_handshake_response(&response), "h").unwrap();
        assert!(!parsed.is_protocol41());
        assert_eq!(parsed, response);
    }

    #[test]
    fn test_response320_without_db_reads_rest_as_auth() {
        let mut payload = vec![0x01, 0x00, 0xFF, 0xFF, 0xFF];
        payload.extend_from_slice(b"bob\0");
        payload.extend_from_slice(b"scrambl");
        let parsed = parse_handshake_response(&payload, "h").unwrap();
        assert_eq!(parsed.username, "bob");
        assert_eq!(parsed.auth_response, b"scrambl".to_vec());
        assert_eq!(parsed.database, None);
    }

    #[test]
    fn test_response320_connect_with_db_missing() {
        let mut payload = vec![CLIENT_CONNECT_WITH_DB as u8, 0x00, 0xFF, 0xFF, 0xFF];
        payload.extend_from_slice(b"bob\0\0");
        let err = parse_handshake_response(&payload, "h").unwrap_err();
        assert_eq!(
            err.as_server_error().unwrap().message(),
            "Access denied for user 'bob'@'h' (using password: NO)"
        );
    }

    #[test]
    fn test_ok_packet_protocol41_is_four_bytes_longer() {
        let ok = OkResult {
            affected_rows: 3,
            last_insert_id: 300,
            status_flags: 0x0102,
            warnings: 0x0304,
        };
        let legacy = build_ok_packet(&ok, 0);
        let modern = build_ok_packet(&ok, CLIENT_PROTOCOL_41);

        assert_eq!(legacy, vec![0x00, 3, 0xFC, 0x2C, 0x01]);
        assert_eq!(modern.len(), legacy.len() + 4);
        assert_eq!(&modern[..legacy.len()], legacy.as_slice());
        assert_eq!(&modern[legacy.len()..], &[0x02, 0x01, 0x04, 0x03]);
    }

    #[test]
    fn test_err_packet_protocol41() {
        let err = ServerError::new(ER_ACCESS_DENIED_ERROR, &[&"root", &"h", &"NO"]);
        let payload = build_err_packet(&err, CLIENT_PROTOCOL_41);

        assert_eq!(payload[0], 0xFF);
        assert_eq!(u16::from_le_bytes([payload[1], payload[2]]), 1045);
        assert_eq!(payload[3], b'#');
        assert_eq!(&payload[4..9], b"28000");
        assert_eq!(&payload[9..], err.message().as_bytes());
        assert!(is_err_packet(&payload));
    }

    #[test]
    fn test_err_packet_legacy() {
        let err = ServerError::new(ER_BAD_DB_ERROR, &[&"x"]);
        let payload = build_err_packet(&err, CLIENT_LONG_PASSWORD);

        assert_eq!(&payload[..3], &[0xFF, 0x19, 0x04]);
        assert_eq!(&payload[3..], b"Unknown database 'x'");
    }

    #[test]
    fn test_read_length_encoded_int() {
        assert_eq!(read_length_encoded_int(&[0x00]).unwrap(), (0, 1));
        assert_eq!(read_length_encoded_int(&[0xFA]).unwrap(), (250, 1));
        assert_eq!(
            read_length_encoded_int(&[0xFC, 0x01, 0x02]).unwrap(),
            (0x0201, 3)
        );
        assert_eq!(
            read_length_encoded_int(&[0xFD, 0x01, 0x02, 0x03]).unwrap(),
            (0x030201, 4)
        );
        assert_eq!(
            read_length_encoded_int(&[0xFE, 1, 2, 3, 4, 5, 6, 7, 8]).unwrap(),
            (0x0807060504030201, 9)
        );
        assert!(read_length_encoded_int(&[0xFB]).is_err());
        assert!(read_length_encoded_int(&[0xFF]).is_err());
        assert!(read_length_encoded_int(&[0xFC, 0x01]).is_err());
        assert!(read_length_encoded_int(&[]).is_err());
    }

    #[test]
    fn test_write_length_encoded_int_width_thresholds() {
        let encode = |v: u64| {
            let mut buf = Vec::new();
            write_length_encoded_int(&mut buf, v);
            buf
        };
        assert_eq!(encode(250), vec![250]);
        assert_eq!(encode(251), vec![0xFC, 251, 0]);
        assert_eq!(encode(65535), vec![0xFC, 0xFF, 0xFF]);
        assert_eq!(encode(65536), vec![0xFD, 0x00, 0x00, 0x01]);
        assert_eq!(encode(0xFF_FFFF), vec![0xFD, 0xFF, 0xFF, 0xFF]);
        assert_eq!(encode(0x100_0000), vec![0xFE, 0, 0, 0, 1, 0, 0, 0, 0]);
    }

    #[test]
    fn test_null_terminated() {
        let (s, len) = read_null_terminated(b"hello\x00world").unwrap();
        assert_eq!(s, b"hello");
        assert_eq!(len, 6);
        assert!(read_null_terminated(b"no null").is_err());
    }
}
