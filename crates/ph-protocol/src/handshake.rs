//! Two-round address exchange
//!
//! The daemon writes `"{tls_addr}\n{plain_addr}"` and waits for a single
//! acknowledgement byte, twice in a row. There is no length prefix: the
//! payload is small enough to arrive in one bounded read. The client fails
//! if the two rounds disagree, which catches a different daemon instance
//! answering in between (a stale daemon racing a fresh one, or a hijack).

use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::HandshakeError;

/// Upper bound on the payload, well above any `host:port` pair
pub const MAX_PAYLOAD_SIZE: usize = 512;

/// Deadline for every read and write during the address rounds
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Number of address rounds per session
pub const HANDSHAKE_ROUNDS: usize = 2;

/// Byte the client sends back after each round
pub const ACK_BYTE: u8 = b'1';

/// Addresses advertised by the daemon
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressPair {
    /// Listener that upgrades upstream requests to TLS
    pub tls: String,
    /// Listener that forwards requests unchanged
    pub plain: String,
}

impl AddressPair {
    /// Create a new address pair
    pub fn new(tls: impl Into<String>, plain: impl Into<String>) -> Self {
        Self {
            tls: tls.into(),
            plain: plain.into(),
        }
    }

    /// Encode as the wire payload
    pub fn encode(&self) -> String {
        format!("{}\n{}", self.tls, self.plain)
    }

    /// Parse a wire payload. Anything other than two non-empty tokens is malformed.
    pub fn parse(payload: &str) -> Result<Self, HandshakeError> {
        let tokens: Vec<&str> = payload.split('\n').collect();
        match tokens.as_slice() {
            [tls, plain] if !tls.is_empty() && !plain.is_empty() => Ok(Self::new(*tls, *plain)),
            _ => Err(HandshakeError::Malformed {
                tokens: tokens.iter().filter(|t| !t.is_empty()).count(),
            }),
        }
    }

    /// Pick the address a client should use
    pub fn select(&self, insecure: bool) -> &str {
        if insecure {
            &self.plain
        } else {
            &self.tls
        }
    }
}

async fn with_deadline<T>(
    step: &'static str,
    fut: impl Future<Output = io::Result<T>>,
) -> Result<T, HandshakeError> {
    match tokio::time::timeout(HANDSHAKE_TIMEOUT, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) if e.kind() == io::ErrorKind::UnexpectedEof => Err(HandshakeError::Closed),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(HandshakeError::Timeout(step)),
    }
}

/// Run the daemon side of the address rounds
pub async fn serve_handshake<S>(stream: &mut S, pair: &AddressPair) -> Result<(), HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let payload = pair.encode();
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(HandshakeError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_PAYLOAD_SIZE,
        });
    }

    for round in 1..=HANDSHAKE_ROUNDS {
        with_deadline("writing addresses", stream.write_all(payload.as_bytes())).await?;
        with_deadline("flushing addresses", stream.flush()).await?;

        let mut ack = [0u8; 1];
        with_deadline("reading acknowledgement", stream.read_exact(&mut ack)).await?;
        tracing::trace!(round, "Handshake round acknowledged");
    }

    Ok(())
}

/// Block until the client disconnects
///
/// With `limit` unset this waits for as long as the client holds the
/// connection open.
pub async fn wait_for_eof<S>(stream: &mut S, limit: Option<Duration>) -> Result<(), HandshakeError>
where
    S: AsyncRead + Unpin,
{
    let drain = async {
        let mut buf = [0u8; 64];
        loop {
            if stream.read(&mut buf).await? == 0 {
                return Ok::<(), io::Error>(());
            }
        }
    };

    match limit {
        Some(limit) => match tokio::time::timeout(limit, drain).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => Err(HandshakeError::Timeout("waiting for client disconnect")),
        },
        None => drain.await.map_err(Into::into),
    }
}

async fn read_round<S>(stream: &mut S) -> Result<AddressPair, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut buf = [0u8; MAX_PAYLOAD_SIZE];
    let n = with_deadline("reading addresses", stream.read(&mut buf)).await?;
    if n == 0 {
        return Err(HandshakeError::Closed);
    }

    let text = std::str::from_utf8(&buf[..n]).map_err(|_| HandshakeError::InvalidEncoding)?;
    let pair = AddressPair::parse(text)?;

    with_deadline("writing acknowledgement", stream.write_all(&[ACK_BYTE])).await?;
    with_deadline("flushing acknowledgement", stream.flush()).await?;
    Ok(pair)
}

/// Run the client side of the address rounds
pub async fn client_handshake<S>(stream: &mut S) -> Result<AddressPair, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let first = read_round(stream).await?;
    for _ in 1..HANDSHAKE_ROUNDS {
        let next = read_round(stream).await?;
        if next != first {
            return Err(HandshakeError::AddressChanged {
                first: first.encode(),
                second: next.encode(),
            });
        }
    }

    tracing::debug!(tls = %first.tls, plain = %first.plain, "Handshake complete");
    Ok(first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[test]
    fn test_parse_and_select() {
        let pair = AddressPair::parse("127.0.0.1:9001\n127.0.0.1:9002").unwrap();
        assert_eq!(pair.select(false), "127.0.0.1:9001");
        assert_eq!(pair.select(true), "127.0.0.1:9002");
    }

    #[test]
    fn test_parse_rejects_wrong_token_count() {
        assert!(matches!(
            AddressPair::parse("127.0.0.1:9001"),
            Err(HandshakeError::Malformed { tokens: 1 })
        ));
        assert!(matches!(
            AddressPair::parse("a:1\nb:2\nc:3"),
            Err(HandshakeError::Malformed { tokens: 3 })
        ));
        assert!(matches!(
            AddressPair::parse("127.0.0.1:9001\n"),
            Err(HandshakeError::Malformed { .. })
        ));
        assert!(AddressPair::parse("").is_err());
    }

    #[test]
    fn test_encode_matches_wire_format() {
        let pair = AddressPair::new("127.0.0.1:9001", "127.0.0.1:9002");
        assert_eq!(pair.encode(), "127.0.0.1:9001\n127.0.0.1:9002");
    }

    #[tokio::test]
    async fn test_full_exchange() {
        let (mut server_end, mut client_end) = duplex(1024);
        let pair = AddressPair::new("127.0.0.1:9001", "127.0.0.1:9002");
        let advertised = pair.clone();

        let server = tokio::spawn(async move {
            serve_handshake(&mut server_end, &advertised).await?;
            wait_for_eof(&mut server_end, None).await
        });

        let received = client_handshake(&mut client_end).await.unwrap();
        assert_eq!(received, pair);

        drop(client_end);
        server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_address_changed_between_rounds() {
        let (mut server_end, mut client_end) = duplex(1024);

        tokio::spawn(async move {
            let mut ack = [0u8; 1];
            for payload in ["127.0.0.1:1\n127.0.0.1:2", "127.0.0.1:3\n127.0.0.1:4"] {
                server_end.write_all(payload.as_bytes()).await.unwrap();
                server_end.read_exact(&mut ack).await.unwrap();
            }
        });

        let err = client_handshake(&mut client_end).await.unwrap_err();
        assert!(matches!(err, HandshakeError::AddressChanged { .. }));
    }

    #[tokio::test]
    async fn test_malformed_payload_not_acknowledged() {
        let (mut server_end, mut client_end) = duplex(1024);
        server_end.write_all(b"only-one-address").await.unwrap();

        let err = client_handshake(&mut client_end).await.unwrap_err();
        assert!(matches!(err, HandshakeError::Malformed { tokens: 1 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_times_out_on_silent_server() {
        let (_server_end, mut client_end) = duplex(1024);
        let err = client_handshake(&mut client_end).await.unwrap_err();
        assert!(matches!(err, HandshakeError::Timeout(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_times_out_without_ack() {
        let (mut server_end, _client_end) = duplex(1024);
        let pair = AddressPair::new("127.0.0.1:9001", "127.0.0.1:9002");
        let err = serve_handshake(&mut server_end, &pair).await.unwrap_err();
        assert!(matches!(err, HandshakeError::Timeout("reading acknowledgement")));
    }

    #[tokio::test]
    async fn test_server_reports_closed_client() {
        let (mut server_end, client_end) = duplex(1024);
        drop(client_end);
        let pair = AddressPair::new("127.0.0.1:9001", "127.0.0.1:9002");
        assert!(serve_handshake(&mut server_end, &pair).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_eof_wait() {
        let (mut server_end, _client_end) = duplex(1024);
        let err = wait_for_eof(&mut server_end, Some(Duration::from_secs(30)))
            .await
            .unwrap_err();
        assert!(matches!(err, HandshakeError::Timeout(_)));
    }
}
