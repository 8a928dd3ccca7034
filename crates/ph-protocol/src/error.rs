//! Handshake error types

use thiserror::Error;

/// Errors that can occur while exchanging proxy addresses
#[derive(Error, Debug)]
pub enum HandshakeError {
    /// Payload did not contain exactly two newline-separated addresses
    #[error("Malformed handshake payload: expected 2 addresses, got {tokens}")]
    Malformed { tokens: usize },

    /// Payload was not valid UTF-8
    #[error("Handshake payload is not valid UTF-8")]
    InvalidEncoding,

    /// Payload exceeds maximum size
    #[error("Handshake payload too large: {size} bytes exceeds maximum of {max} bytes")]
    PayloadTooLarge { size: usize, max: usize },

    /// The daemon answered the two rounds with different addresses
    #[error("Proxy address changed between rounds: {first:?} then {second:?}")]
    AddressChanged { first: String, second: String },

    /// A handshake step missed its deadline
    #[error("Handshake timed out while {0}")]
    Timeout(&'static str),

    /// Peer closed the connection mid-handshake
    #[error("Connection closed during handshake")]
    Closed,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
