//! ph-core: Core building blocks for persistent-https
//!
//! This crate provides the permission-checked Unix socket shared by the
//! proxy daemon and its clients, configuration structures, build identity
//! handling and the shared error types.

pub mod config;
pub mod error;
pub mod identity;
pub mod socket;

pub use error::{ConfigError, PhError, SocketError};
pub use identity::BuildIdentity;
pub use socket::SocketGuard;
