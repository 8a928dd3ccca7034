//! ph-proxy: Local daemon keeping upstream connections warm
//!
//! The daemon binds two loopback HTTP proxies, one forwarding requests
//! unchanged and one upgrading them to HTTPS, and advertises both over a
//! permission-checked Unix socket. Clients hold a socket session open for
//! as long as they use the proxy; the daemon shuts itself down when idle,
//! when its binary is replaced, or on a signal.

pub mod daemon;
pub mod ipc;
pub mod monitor;
pub mod server;
pub mod session;
pub mod state;

pub use daemon::{Daemon, StartOutcome, LISTENING_PREFIX};
pub use state::{DaemonPhase, ProxyEndpoints, ProxyState, ShutdownCause};
