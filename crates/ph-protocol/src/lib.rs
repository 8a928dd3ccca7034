//! ph-protocol: Address-exchange handshake for the persistent-https proxy
//!
//! This crate defines the two-round exchange spoken over the proxy's Unix
//! socket. The daemon advertises its TLS-upgrading and plain listener
//! addresses; the client picks one and confirms the daemon did not change
//! underneath it.

pub mod error;
pub mod handshake;
pub mod ready;

pub use error::HandshakeError;
pub use handshake::{
    client_handshake, serve_handshake, wait_for_eof, AddressPair, ACK_BYTE, HANDSHAKE_ROUNDS,
    HANDSHAKE_TIMEOUT, MAX_PAYLOAD_SIZE,
};
pub use ready::{is_ready_line, ALREADY_RUNNING_LINE, READY_LINE};
