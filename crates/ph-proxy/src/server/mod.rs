//! Reverse proxy listeners
//!
//! Two loopback HTTP listeners forward every request to the upstream named
//! in the request. One passes the scheme through, the other forces https
//! so the delegate can speak plain HTTP while the daemon owns the pooled
//! TLS connections.

mod reverse;

pub use reverse::{ReverseProxy, UpstreamScheme};

use tokio::net::TcpListener;

/// Bind an ephemeral port on 127.0.0.1
pub async fn bind_loopback() -> std::io::Result<TcpListener> {
    TcpListener::bind(("127.0.0.1", 0)).await
}
