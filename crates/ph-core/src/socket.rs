//! Permission-checked Unix socket for daemon discovery
//!
//! The proxy is found through a fixed socket path inside a directory under
//! the user's home. Any local process that can write to that directory
//! could pre-create or rebind the socket and impersonate the daemon, so
//! every listen and dial first verifies that the directory is mode 0700
//! and owned by the effective user.
//!
//! # Security Model
//!
//! - The check is repeated on every listen and dial, never cached
//! - A violation is refused, never repaired
//! - The only repair is creating a missing directory, and only on listen

use std::fs;
use std::io;
use std::os::unix::fs::{DirBuilderExt, MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use tokio::net::{UnixListener, UnixStream};

use crate::error::SocketError;

/// Socket file name inside the socket directory
pub const SOCKET_FILENAME: &str = "persistent-https-proxy-socket";

/// Socket directory name relative to the home directory
pub const DEFAULT_SOCKET_DIR: &str = ".git-credential-cache";

/// Required mode of the socket directory
const REQUIRED_MODE: u32 = 0o700;

/// Unix socket inside a directory that must belong to the current user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketGuard {
    dir: PathBuf,
}

impl SocketGuard {
    /// Create a guard for a socket directory
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Guard for `~/.git-credential-cache`
    pub fn default_for_user() -> Result<Self, SocketError> {
        let home = dirs::home_dir().ok_or(SocketError::NoHomeDir)?;
        Ok(Self::new(home.join(DEFAULT_SOCKET_DIR)))
    }

    /// Directory holding the socket
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Full socket path
    pub fn path(&self) -> PathBuf {
        self.dir.join(SOCKET_FILENAME)
    }

    /// Verify directory mode and owner against the effective user
    pub fn check_permissions(&self) -> Result<(), SocketError> {
        check_directory(&self.dir, current_euid())
    }

    /// Bind the socket, creating the directory (mode 0700) if it is missing
    ///
    /// Must be called from within a tokio runtime.
    pub fn listen(&self) -> Result<UnixListener, SocketError> {
        match self.check_permissions() {
            Err(SocketError::NotFound(_)) => {
                tracing::debug!("Creating socket directory {:?}", self.dir);
                fs::DirBuilder::new()
                    .recursive(true)
                    .mode(REQUIRED_MODE)
                    .create(&self.dir)
                    .map_err(|source| SocketError::Io {
                        path: self.dir.clone(),
                        source,
                    })?;
                self.check_permissions()?;
            }
            other => other?,
        }

        let path = self.path();
        UnixListener::bind(&path).map_err(|e| map_io_error(path, e))
    }

    /// Connect to the socket. Never creates anything.
    pub async fn dial(&self) -> Result<UnixStream, SocketError> {
        self.check_permissions()?;

        let path = self.path();
        UnixStream::connect(&path)
            .await
            .map_err(|e| map_io_error(path, e))
    }

    /// Remove a socket file that nothing answers on
    pub fn remove_stale(&self) -> Result<(), SocketError> {
        let path = self.path();
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(SocketError::Io { path, source }),
        }
    }
}

/// Effective user id of this process
pub fn current_euid() -> u32 {
    // SAFETY: geteuid has no preconditions and cannot fail
    unsafe { libc::geteuid() }
}

fn map_io_error(path: PathBuf, e: io::Error) -> SocketError {
    match e.kind() {
        io::ErrorKind::NotFound => SocketError::NotFound(path),
        io::ErrorKind::ConnectionRefused => SocketError::ConnectionRefused(path),
        io::ErrorKind::AddrInUse => SocketError::AddrInUse(path),
        _ => SocketError::Io { path, source: e },
    }
}

/// Check that `dir` is a real directory, mode 0700, owned by `euid`
fn check_directory(dir: &Path, euid: u32) -> Result<(), SocketError> {
    let metadata = match fs::symlink_metadata(dir) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(SocketError::NotFound(dir.to_path_buf()))
        }
        Err(source) => {
            return Err(SocketError::Io {
                path: dir.to_path_buf(),
                source,
            })
        }
    };

    let insecure = |reason: String| SocketError::InsecureDirectory {
        path: dir.to_path_buf(),
        reason,
    };

    if !metadata.is_dir() {
        return Err(insecure("not a directory".to_string()));
    }

    let mode = metadata.permissions().mode() & 0o777;
    if mode != REQUIRED_MODE {
        return Err(insecure(format!(
            "mode is {:04o}, expected {:04o}",
            mode, REQUIRED_MODE
        )));
    }

    if metadata.uid() != euid {
        return Err(insecure(format!(
            "owned by uid {}, expected {}",
            metadata.uid(),
            euid
        )));
    }

    Ok(())
}
