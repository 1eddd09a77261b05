//! Packet transport for the connection phase.
//!
//! The handshake only needs whole, already-defragmented payloads plus a way
//! to reset the sequence counter. [`Transport`] is that contract;
//! [`PacketStream`] implements it over any tokio byte stream.

use std::io;
use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::{HandshakeError, Result};
use crate::protocol::mysql::codes::ER_NET_PACKET_TOO_LARGE;
use crate::protocol::mysql::{PacketHeader, ServerError};

/// Largest reassembled payload accepted from a client (64 MiB)
pub const DEFAULT_MAX_ALLOWED_PACKET: usize = 64 * 1024 * 1024;

/// Limit while the client is still unauthenticated (16 KiB). A handshake
/// response is a few hundred bytes.
pub const DEFAULT_MAX_HANDSHAKE_PACKET: usize = 16 * 1024;

/// Single-packet I/O used by the handshake.
///
/// Reads and writes carry payloads only; implementations own framing,
/// sequence numbering and splitting of oversized payloads.
#[async_trait]
pub trait Transport: Send {
    /// Read one logical packet.
    async fn read_packet(&mut self) -> Result<Vec<u8>>;

    /// Write one logical packet and flush it.
    async fn write_packet(&mut self, payload: &[u8]) -> Result<()>;

    /// Zero the packet sequence counter.
    fn reset_sequence(&mut self);

    /// Remote address, when known.
    fn peer_addr(&self) -> Option<SocketAddr>;

    /// Shut the connection down. Pending reads and writes fail afterwards.
    async fn close(&mut self) -> Result<()>;
}

/// MySQL packet framing over a byte stream.
///
/// Each packet is a 4-byte header (3-byte little-endian length, 1-byte
/// sequence id) followed by the payload. Payloads of 2^24 - 1 bytes or more
/// are split across packets and closed by a shorter one.
pub struct PacketStream<S> {
    stream: S,
    peer: Option<SocketAddr>,
    sequence_id: u8,
    max_allowed_packet: usize,
    protocol_debug: bool,
}

impl PacketStream<TcpStream> {
    /// Wrap an accepted TCP connection
    pub fn tcp(stream: TcpStream) -> Self {
        let peer = stream.peer_addr().ok();
        Self::new(stream, peer)
    }
}

impl<S> PacketStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S, peer: Option<SocketAddr>) -> Self {
        Self {
            stream,
            peer,
            sequence_id: 0,
            max_allowed_packet: DEFAULT_MAX_ALLOWED_PACKET,
            protocol_debug: false,
        }
    }

    /// Limit the size of reassembled incoming payloads
    pub fn with_max_allowed_packet(mut self, max: usize) -> Self {
        self.max_allowed_packet = max;
        self
    }

    /// Change the payload limit on a live stream, e.g. once the client
    /// has authenticated
    pub fn set_max_allowed_packet(&mut self, max: usize) {
        self.max_allowed_packet = max;
    }

    pub fn max_allowed_packet(&self) -> usize {
        self.max_allowed_packet
    }

    /// Log a hex preview of every packet at debug level
    pub fn with_protocol_debug(mut self, enabled: bool) -> Self {
        self.protocol_debug = enabled;
        self
    }

    /// Sequence id expected on the next packet
    pub fn sequence_id(&self) -> u8 {
        self.sequence_id
    }

    pub fn get_ref(&self) -> &S {
        &self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }

    fn log_packet(&self, direction: &str, header: PacketHeader, payload: &[u8]) {
        if !self.protocol_debug {
            return;
        }
        let preview: String = payload
            .iter()
            .take(64)
            .map(|b| format!("{:02x}", b))
            .collect();
        debug!(
            direction,
            seq = header.sequence_id,
            len = header.payload_length,
            peer = ?self.peer,
            "packet {}",
            preview
        );
    }
}

#[async_trait]
impl<S> Transport for PacketStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn read_packet(&mut self) -> Result<Vec<u8>> {
        let mut payload = Vec::new();

        loop {
            let mut header_buf = [0u8; 4];
            self.stream.read_exact(&mut header_buf).await?;
            let header = PacketHeader::from_bytes(header_buf);

            if header.sequence_id != self.sequence_id {
                return Err(HandshakeError::Protocol(format!(
                    "Packet sequence out of order: expected {}, got {}",
                    self.sequence_id, header.sequence_id
                )));
            }
            self.sequence_id = self.sequence_id.wrapping_add(1);

            let len = header.payload_length as usize;
            if payload.len() + len > self.max_allowed_packet {
                return Err(ServerError::new(ER_NET_PACKET_TOO_LARGE, &[]).into());
            }

            // grow with the bytes that actually arrive, not the declared length
            let start = payload.len();
            let read = (&mut self.stream)
                .take(len as u64)
                .read_to_end(&mut payload)
                .await?;
            if read < len {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("packet truncated: expected {} bytes, got {}", len, read),
                )
                .into());
            }
            self.log_packet("recv", header, &payload[start..]);

            if header.payload_length < PacketHeader::MAX_PAYLOAD_LENGTH {
                return Ok(payload);
            }
        }
    }

    async fn write_packet(&mut self, payload: &[u8]) -> Result<()> {
        let max = PacketHeader::MAX_PAYLOAD_LENGTH as usize;
        let mut rest = payload;

        loop {
            let chunk_len = rest.len().min(max);
            let (chunk, tail) = rest.split_at(chunk_len);

            let header = PacketHeader::new(chunk_len as u32, self.sequence_id);
            self.stream.write_all(&header.to_bytes()).await?;
            self.stream.write_all(chunk).await?;
            self.log_packet("send", header, chunk);
            self.sequence_id = self.sequence_id.wrapping_add(1);

            rest = tail;
            // a full-size chunk must be followed by another, possibly empty, one
            if chunk_len < max {
                break;
            }
        }

        self.stream.flush().await?;
        Ok(())
    }

    fn reset_sequence(&mut self) {
        self.sequence_id = 0;
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    async fn close(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::task::{Context, Poll};
    use std::time::Duration;
    use tokio::io::{duplex, ReadBuf};

    /// Delivers one header, then stalls, remembering the largest read buffer
    /// it was handed.
    struct StallAfterHeader {
        header: Option<[u8; 4]>,
        largest_read: Arc<AtomicUsize>,
    }

    impl AsyncRead for StallAfterHeader {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            if let Some(header) = self.header.take() {
                buf.put_slice(&header);
                return Poll::Ready(Ok(()));
            }
            self.largest_read.fetch_max(buf.remaining(), Ordering::SeqCst);
            Poll::Pending
        }
    }

    impl AsyncWrite for StallAfterHeader {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_write_then_read_small_packet() {
        let (client, server) = duplex(1024);
        let mut server = PacketStream::new(server, None);
        let mut client = PacketStream::new(client, None);

        server.write_packet(b"hello").await.unwrap();
        assert_eq!(server.sequence_id(), 1);

        // client expects seq 0 as well
        let payload = client.read_packet().await.unwrap();
        assert_eq!(payload, b"hello");
        assert_eq!(client.sequence_id(), 1);
    }

    #[tokio::test]
    async fn test_header_bytes_on_the_wire() {
        let (mut raw, server) = duplex(1024);
        let mut server = PacketStream::new(server, None);
        server.write_packet(&[0xAB; 3]).await.unwrap();
        server.write_packet(&[]).await.unwrap();

        let mut buf = [0u8; 11];
        raw.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf[..7], &[3, 0, 0, 0, 0xAB, 0xAB, 0xAB]);
        assert_eq!(&buf[7..], &[0, 0, 0, 1]);
    }

    #[tokio::test]
    async fn test_out_of_order_sequence_is_protocol_error() {
        let (mut raw, server) = duplex(1024);
        let mut server = PacketStream::new(server, None);

        raw.write_all(&[1, 0, 0, 5, 0x00]).await.unwrap();
        let err = server.read_packet().await.unwrap_err();
        assert!(matches!(err, HandshakeError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_reset_sequence() {
        let (mut raw, server) = duplex(1024);
        let mut server = PacketStream::new(server, None);

        raw.write_all(&[1, 0, 0, 0, 0x0e]).await.unwrap();
        server.read_packet().await.unwrap();
        assert_eq!(server.sequence_id(), 1);
        server.reset_sequence();

        raw.write_all(&[1, 0, 0, 0, 0x01]).await.unwrap();
        assert_eq!(server.read_packet().await.unwrap(), vec![0x01]);
    }

    #[tokio::test]
    async fn test_eof_is_io_error() {
        let (raw, server) = duplex(1024);
        let mut server = PacketStream::new(server, None);
        drop(raw);

        let err = server.read_packet().await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_oversized_payload_is_rejected() {
        let (mut raw, server) = duplex(1024);
        let mut server = PacketStream::new(server, None).with_max_allowed_packet(4);

        raw.write_all(&[5, 0, 0, 0, 1, 2, 3, 4, 5]).await.unwrap();
        let err = server.read_packet().await.unwrap_err();
        assert_eq!(
            err.as_server_error().unwrap().number(),
            ER_NET_PACKET_TOO_LARGE
        );
    }

    #[tokio::test]
    async fn test_declared_length_is_not_preallocated() {
        let largest_read = Arc::new(AtomicUsize::new(0));
        let mut server = PacketStream::new(
            StallAfterHeader {
                header: Some([0xFF, 0xFF, 0xFF, 0x00]),
                largest_read: Arc::clone(&largest_read),
            },
            None,
        );

        let result = tokio::time::timeout(Duration::from_millis(50), server.read_packet()).await;
        assert!(result.is_err(), "read should still be waiting for payload");

        let largest = largest_read.load(Ordering::SeqCst);
        assert!(largest > 0, "payload read never started");
        assert!(
            largest < 64 * 1024,
            "a bare header made the stream hand out a {} byte buffer",
            largest
        );
    }

    #[tokio::test]
    async fn test_truncated_payload_is_io_error() {
        let (mut raw, server) = duplex(1024);
        let mut server = PacketStream::new(server, None);

        raw.write_all(&[10, 0, 0, 0, 1, 2, 3]).await.unwrap();
        drop(raw);
        let err = server.read_packet().await.unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_limit_can_be_raised_after_authentication() {
        let (mut raw, server) = duplex(1024);
        let mut server = PacketStream::new(server, None).with_max_allowed_packet(4);

        raw.write_all(&[8, 0, 0, 0]).await.unwrap();
        raw.write_all(&[7; 8]).await.unwrap();
        let err = server.read_packet().await.unwrap_err();
        assert_eq!(
            err.as_server_error().unwrap().number(),
            ER_NET_PACKET_TOO_LARGE
        );

        // next packet sits behind the rejected payload; start clean
        let (mut raw, stream) = duplex(1024);
        let mut server = PacketStream::new(stream, None).with_max_allowed_packet(4);
        server.set_max_allowed_packet(DEFAULT_MAX_ALLOWED_PACKET);
        assert_eq!(server.max_allowed_packet(), DEFAULT_MAX_ALLOWED_PACKET);

        raw.write_all(&[8, 0, 0, 0]).await.unwrap();
        raw.write_all(&[7; 8]).await.unwrap();
        assert_eq!(server.read_packet().await.unwrap(), vec![7; 8]);
    }

    #[tokio::test]
    async fn test_large_payload_is_split_and_reassembled() {
        let (client, server) = duplex(64 * 1024);
        let mut server = PacketStream::new(server, None);
        let mut client = PacketStream::new(client, None);

        let payload = vec![0x5A; PacketHeader::MAX_PAYLOAD_LENGTH as usize + 10];
        let expected = payload.clone();

        let writer = tokio::spawn(async move {
            server.write_packet(&payload).await.unwrap();
            server.sequence_id()
        });
        let received = client.read_packet().await.unwrap();

        assert_eq!(received.len(), expected.len());
        assert_eq!(received, expected);
        assert_eq!(writer.await.unwrap(), 2);
        assert_eq!(client.sequence_id(), 2);
    }
}
