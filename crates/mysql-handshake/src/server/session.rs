//! Minimal command phase after a successful handshake.
//!
//! Keeps clients that ping or switch databases happy. Queries are refused
//! with `ER_NOT_SUPPORTED_YET`.

use tokio::sync::broadcast;

use super::handshake::ServerConn;
use super::identity::ServerIdentity;
use super::metrics::HandshakeMetrics;
use super::transport::Transport;
use crate::error::Result;
use crate::protocol::mysql::codes::{ER_NOT_SUPPORTED_YET, ER_NO_DB_ERROR, ER_SERVER_SHUTDOWN};
use crate::protocol::mysql::{ServerError, COM_INIT_DB, COM_PING, COM_QUIT};

/// Why the command loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Client sent COM_QUIT
    Quit,
    /// Client went away without COM_QUIT
    Disconnected,
    /// Server is shutting down
    Shutdown,
}

/// Answer commands on `conn` until the client quits, disconnects or the
/// server shuts down.
///
/// Each command starts a new sequence, so the counter is reset before
/// every read.
pub async fn run_session<I, T>(
    conn: &mut ServerConn<I, T>,
    shutdown_rx: &mut broadcast::Receiver<()>,
    metrics: &HandshakeMetrics,
) -> Result<SessionEnd>
where
    I: ServerIdentity,
    T: Transport,
{
    let conn_id = conn.connection_id();

    loop {
        conn.reset_sequence();

        let packet = tokio::select! {
            result = conn.read_packet() => result,
            _ = shutdown_rx.recv() => {
                debug!(conn_id, "Closing session for shutdown");
                let err = ServerError::new(ER_SERVER_SHUTDOWN, &[]);
                if let Err(e) = conn.write_server_error(&err).await {
                    trace!(conn_id, error = %e, "Could not send shutdown notice");
                }
                return Ok(SessionEnd::Shutdown);
            }
        };

        let packet = match packet {
            Ok(packet) => packet,
            Err(e) if e.is_transport() => {
                debug!(conn_id, error = %e, "Client disconnected");
                return Ok(SessionEnd::Disconnected);
            }
            Err(e) => return Err(e),
        };

        let Some((&command, body)) = packet.split_first() else {
            let err = ServerError::new(ER_NOT_SUPPORTED_YET, &[&"empty command"]);
            conn.write_server_error(&err).await?;
            continue;
        };

        metrics.command_handled();
        trace!(conn_id, command = format_args!("0x{:02x}", command), "Command");

        match command {
            COM_QUIT => {
                debug!(conn_id, "Client quit");
                return Ok(SessionEnd::Quit);
            }
            COM_PING => conn.write_ok(None).await?,
            COM_INIT_DB => {
                let database = String::from_utf8_lossy(body).into_owned();
                if database.is_empty() {
                    let err = ServerError::new(ER_NO_DB_ERROR, &[]);
                    conn.write_server_error(&err).await?;
                    continue;
                }

                let user = conn.username().to_string();
                match conn.identity().check_database(&user, &database).await {
                    Ok(()) => {
                        debug!(conn_id, database = %database, "Database changed");
                        conn.set_database(database);
                        conn.write_ok(None).await?;
                    }
                    Err(e) => conn.write_error(&e).await?,
                }
            }
            other => {
                let err = ServerError::new(ER_NOT_SUPPORTED_YET, &[&command_name(other)]);
                conn.write_server_error(&err).await?;
            }
        }
    }
}

/// Human-readable name for a command byte
fn command_name(command: u8) -> String {
    match command {
        0x03 => "COM_QUERY".to_string(),
        0x04 => "COM_FIELD_LIST".to_string(),
        0x05 => "COM_CREATE_DB".to_string(),
        0x06 => "COM_DROP_DB".to_string(),
        0x07 => "COM_REFRESH".to_string(),
        0x09 => "COM_STATISTICS".to_string(),
        0x0a => "COM_PROCESS_INFO".to_string(),
        0x0c => "COM_PROCESS_KILL".to_string(),
        0x0d => "COM_DEBUG".to_string(),
        0x11 => "COM_CHANGE_USER".to_string(),
        0x16 => "COM_STMT_PREPARE".to_string(),
        0x17 => "COM_STMT_EXECUTE".to_string(),
        0x19 => "COM_STMT_CLOSE".to_string(),
        0x1f => "COM_RESET_CONNECTION".to_string(),
        other => format!("command 0x{:02x}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{IdentitySettings, StaticAuthority, UserAccount};
    use crate::protocol::mysql::auth::compute_auth_response;
    use crate::protocol::mysql::*;
    use crate::server::{handshake, PacketStream};
    use tokio::io::{duplex, DuplexStream};

    async fn connected() -> (
        ServerConn<crate::auth::StaticIdentity, PacketStream<DuplexStream>>,
        PacketStream<DuplexStream>,
    ) {
        let authority = StaticAuthority::new(
            IdentitySettings::default(),
            vec![UserAccount::new("app", "pw").with_databases(["orders", "stock"])],
        );
        let (client, server) = duplex(4096);
        let mut client = PacketStream::new(client, None);

        let server_task = tokio::spawn(handshake(
            authority.identity(None),
            PacketStream::new(server, None),
        ));

        let greeting = parse_greeting(&client.read_packet().await.unwrap()).unwrap();
        let response = HandshakeResponse {
            capability_flags: CLIENT_PROTOCOL_41 | CLIENT_SECURE_CONNECTION,
            username: "app".into(),
            auth_response: compute_auth_response("pw", &greeting.salt),
            ..Default::default()
        };
        client
            .write_packet(&build_handshake_response(&response))
            .await
            .unwrap();
        assert!(is_ok_packet(&client.read_packet().await.unwrap()));

        (server_task.await.unwrap().unwrap(), client)
    }

    async fn send_command(client: &mut PacketStream<DuplexStream>, payload: &[u8]) -> Vec<u8> {
        client.reset_sequence();
        client.write_packet(payload).await.unwrap();
        client.read_packet().await.unwrap()
    }

    #[tokio::test]
    async fn test_ping_init_db_and_quit() {
        let (mut conn, mut client) = connected().await;
        let (_tx, mut rx) = broadcast::channel(1);
        let metrics = HandshakeMetrics::new();

        let client_task = tokio::spawn(async move {
            let ping = send_command(&mut client, &[COM_PING]).await;
            assert!(is_ok_packet(&ping));

            let mut init_db = vec![COM_INIT_DB];
            init_db.extend_from_slice(b"stock");
            assert!(is_ok_packet(&send_command(&mut client, &init_db).await));

            let mut denied = vec![COM_INIT_DB];
            denied.extend_from_slice(b"billing");
            let err = send_command(&mut client, &denied).await;
            assert!(is_err_packet(&err));
            assert_eq!(u16::from_le_bytes([err[1], err[2]]), 1044);

            let query = send_command(&mut client, b"\x03SELECT 1").await;
            assert!(is_err_packet(&query));
            assert_eq!(u16::from_le_bytes([query[1], query[2]]), ER_NOT_SUPPORTED_YET);
            assert!(String::from_utf8_lossy(&query[9..]).contains("COM_QUERY"));

            client.reset_sequence();
            client.write_packet(&[COM_QUIT]).await.unwrap();
            client
        });

        let end = run_session(&mut conn, &mut rx, &metrics).await.unwrap();
        client_task.await.unwrap();

        assert_eq!(end, SessionEnd::Quit);
        assert_eq!(conn.database(), "stock");
        assert_eq!(metrics.snapshot().commands_handled, 5);
    }

    #[tokio::test]
    async fn test_disconnect_ends_session() {
        let (mut conn, client) = connected().await;
        let (_tx, mut rx) = broadcast::channel(1);
        drop(client);

        let end = run_session(&mut conn, &mut rx, &HandshakeMetrics::new())
            .await
            .unwrap();
        assert_eq!(end, SessionEnd::Disconnected);
    }

    #[tokio::test]
    async fn test_shutdown_sends_error() {
        let (mut conn, mut client) = connected().await;
        let (tx, mut rx) = broadcast::channel(1);
        tx.send(()).unwrap();

        let end = run_session(&mut conn, &mut rx, &HandshakeMetrics::new())
            .await
            .unwrap();
        assert_eq!(end, SessionEnd::Shutdown);

        client.reset_sequence();
        let err = client.read_packet().await.unwrap();
        assert_eq!(u16::from_le_bytes([err[1], err[2]]), ER_SERVER_SHUTDOWN);
    }

    #[tokio::test]
    async fn test_session_runs_on_spawned_task() {
        let (mut conn, mut client) = connected().await;
        let (_tx, mut rx) = broadcast::channel(1);

        let server_task = tokio::spawn(async move {
            let metrics = HandshakeMetrics::new();
            run_session(&mut conn, &mut rx, &metrics).await
        });

        assert!(is_err_packet(&send_command(&mut client, &[]).await));
        assert!(is_err_packet(&send_command(&mut client, &[COM_INIT_DB]).await));
        let unknown = send_command(&mut client, &[0x16]).await;
        assert_eq!(u16::from_le_bytes([unknown[1], unknown[2]]), ER_NOT_SUPPORTED_YET);

        client.reset_sequence();
        client.write_packet(&[COM_QUIT]).await.unwrap();
        assert_eq!(server_task.await.unwrap().unwrap(), SessionEnd::Quit);
    }

    #[test]
    fn test_command_names() {
        assert_eq!(command_name(0x03), "COM_QUERY");
        assert_eq!(command_name(0x99), "command 0x99");
    }
}
