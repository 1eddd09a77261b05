//! TCP listener for incoming MySQL clients

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Semaphore};

use super::handshake::handshake;
use super::identity::IdentityFactory;
use super::metrics::HandshakeMetrics;
use super::session::run_session;
use super::transport::{PacketStream, Transport};
use crate::config::Config;
use crate::error::{HandshakeError, Result};
use crate::protocol::mysql::codes::{
    ER_ACCESS_DENIED_ERROR, ER_CON_COUNT_ERROR, ER_DBACCESS_DENIED_ERROR,
};
use crate::protocol::mysql::{build_err_packet, ServerError};

/// How long a refused client gets to receive its ER_CON_COUNT_ERROR
const REJECT_WRITE_TIMEOUT: Duration = Duration::from_secs(2);

/// Accepts connections and runs one handshake task per client
pub struct Listener<F> {
    /// TCP listener
    listener: TcpListener,
    /// Configuration
    config: Arc<Config>,
    /// Hands out a fresh identity per connection
    factory: Arc<F>,
    metrics: Arc<HandshakeMetrics>,
    /// Shutdown signal receiver
    shutdown_rx: broadcast::Receiver<()>,
    /// Connection limit semaphore (None = unlimited)
    connection_semaphore: Option<Arc<Semaphore>>,
}

/// Per-connection settings copied out of the config
#[derive(Clone, Copy)]
struct ConnectionSettings {
    handshake_timeout: Option<Duration>,
    max_handshake_packet: usize,
    max_allowed_packet: usize,
    protocol_debug: bool,
}

impl<F: IdentityFactory> Listener<F> {
    /// Bind to the configured address.
    pub async fn bind(
        config: Arc<Config>,
        factory: Arc<F>,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<Self> {
        let addr = format!(
            "{}:{}",
            config.server.listen_address, config.server.listen_port
        );

        let listener = TcpListener::bind(&addr).await?;
        let local = listener.local_addr()?;

        // 0 = unlimited
        let connection_semaphore = if config.server.max_connections > 0 {
            info!(
                "Listening on {} (max {} connections)",
                local, config.server.max_connections
            );
            Some(Arc::new(Semaphore::new(config.server.max_connections)))
        } else {
            info!("Listening on {} (unlimited connections)", local);
            None
        };

        Ok(Self {
            listener,
            config,
            factory,
            metrics: HandshakeMetrics::shared(),
            shutdown_rx,
            connection_semaphore,
        })
    }

    pub fn metrics(&self) -> Arc<HandshakeMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Get the local address the listener is bound to.
    ///
    /// Useful when binding to port 0.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the accept loop until shutdown
    pub async fn run(mut self) -> Result<()> {
        let settings = ConnectionSettings {
            handshake_timeout: match self.config.server.handshake_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            max_handshake_packet: self.config.server.max_handshake_packet,
            max_allowed_packet: self.config.server.max_allowed_packet,
            protocol_debug: self.config.logging.protocol_debug,
        };

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, addr)) => self.accept(stream, addr, settings),
                        Err(e) => {
                            error!("Accept error: {}", e);
                            tokio::time::sleep(Duration::from_millis(100)).await;
                        }
                    }
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping listener");
                    break;
                }
            }
        }

        let snapshot = self.metrics.snapshot();
        info!(
            "Listener stopped. Total: {}, Active: {}, Rejected: {}, Authenticated: {}",
            snapshot.connections_accepted,
            snapshot.connections_active,
            snapshot.connections_rejected_limit,
            snapshot.auth_successes
        );

        Ok(())
    }

    fn accept(&self, stream: TcpStream, addr: SocketAddr, settings: ConnectionSettings) {
        let permit = match self.connection_semaphore {
            Some(ref semaphore) => match Arc::clone(semaphore).try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    warn!(
                        "Connection from {} rejected: max connections ({}) reached",
                        addr, self.config.server.max_connections
                    );
                    self.metrics.connection_rejected_limit();
                    let capabilities = self.config.identity.capabilities;
                    tokio::spawn(reject_too_many(stream, addr, capabilities));
                    return;
                }
            },
            None => None,
        };

        debug!("Accepted connection from {}", addr);
        self.metrics.connection_accepted();

        let factory = Arc::clone(&self.factory);
        let metrics = Arc::clone(&self.metrics);
        let shutdown_rx = self.shutdown_rx.resubscribe();

        tokio::spawn(async move {
            // held for the connection's lifetime
            let _permit = permit;

            if let Err(e) =
                handle_connection(stream, addr, factory.as_ref(), settings, &metrics, shutdown_rx)
                    .await
            {
                if e.is_transport() {
                    debug!("Connection from {} error: {}", addr, e);
                } else {
                    warn!("Connection from {} error: {}", addr, e);
                }
            }
            metrics.connection_closed();
            debug!("Connection from {} closed", addr);
        });
    }
}

/// Handshake, then the command loop.
async fn handle_connection<F: IdentityFactory>(
    stream: TcpStream,
    addr: SocketAddr,
    factory: &F,
    settings: ConnectionSettings,
    metrics: &HandshakeMetrics,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<()> {
    let _ = stream.set_nodelay(true);

    let identity = factory.identity_for(Some(addr));
    let transport = PacketStream::tcp(stream)
        .with_max_allowed_packet(settings.max_handshake_packet)
        .with_protocol_debug(settings.protocol_debug);

    let result = match settings.handshake_timeout {
        Some(limit) => match tokio::time::timeout(limit, handshake(identity, transport)).await {
            Ok(result) => result,
            Err(_) => {
                metrics.handshake_timeout();
                return Err(HandshakeError::Timeout(format!(
                    "handshake with {} did not finish within {:?}",
                    addr, limit
                )));
            }
        },
        None => handshake(identity, transport).await,
    };

    let mut conn = match result {
        Ok(conn) => {
            metrics.auth_success();
            conn
        }
        Err(e) => {
            record_failure(metrics, &e);
            return Err(e);
        }
    };

    conn.transport_mut().set_max_allowed_packet(settings.max_allowed_packet);

    let end = run_session(&mut conn, &mut shutdown_rx, metrics).await;
    if let Err(e) = conn.close().await {
        trace!("Error closing connection from {}: {}", addr, e);
    }
    debug!("Session with {} ended: {:?}", addr, end);
    end.map(|_| ())
}

fn record_failure(metrics: &HandshakeMetrics, err: &HandshakeError) {
    match err {
        HandshakeError::Server(e)
            if e.number() == ER_ACCESS_DENIED_ERROR || e.number() == ER_DBACCESS_DENIED_ERROR =>
        {
            metrics.auth_failure()
        }
        HandshakeError::Server(_) | HandshakeError::Protocol(_) => metrics.protocol_error(),
        _ => {}
    }
}

/// Send ER_CON_COUNT_ERROR in place of the greeting, then close.
async fn reject_too_many(stream: TcpStream, addr: SocketAddr, capabilities: u32) {
    let mut transport = PacketStream::tcp(stream);
    let payload = build_err_packet(&ServerError::new(ER_CON_COUNT_ERROR, &[]), capabilities);

    match tokio::time::timeout(REJECT_WRITE_TIMEOUT, transport.write_packet(&payload)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("Could not notify {} of connection limit: {}", addr, e),
        Err(_) => debug!("Timed out notifying {} of connection limit", addr),
    }
    let _ = transport.close().await;
}
