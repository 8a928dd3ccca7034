//! Unix socket server for handshake sessions
//!
//! Each accepted connection is one session: the client learns the proxy
//! addresses and then holds the connection open while it uses them.

mod server;

pub use server::IpcServer;
