//! ph-cli: Git remote helper for `persistent-https://` URLs
//!
//! Rewrites the remote URL to plain `http`, makes sure a proxy daemon is
//! running, and runs `git-remote-http` against the proxy it advertises.

pub mod connect;
pub mod coordinator;
pub mod delegate;
pub mod remote;

pub use connect::{connect, DaemonLauncher, ProxySession};
pub use coordinator::Coordinator;
pub use delegate::{Delegate, DelegateOutcome};
pub use remote::{RemoteError, RemoteInvocation};
