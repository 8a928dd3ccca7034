//! Build identity used to detect that a newer binary has been deployed
//!
//! Every binary embeds a label at compile time and prints it when run with
//! `--print-label`. A running daemon periodically asks its own on-disk
//! binary for the label; a different answer means the file was replaced.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

/// Flag that makes a binary print its build label and exit
pub const PRINT_LABEL_FLAG: &str = "--print-label";

/// Deadline for a `--print-label` run
pub const LABEL_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Suffix Linux appends to `/proc/self/exe` once the file is unlinked
const DELETED_SUFFIX: &str = " (deleted)";

/// Opaque build label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildIdentity(String);

impl BuildIdentity {
    /// Create an identity from a label
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// Identity embedded in this build
    ///
    /// Uses `PERSISTENT_HTTPS_BUILD_LABEL` when set at compile time,
    /// otherwise the package version.
    pub fn current() -> Self {
        Self::new(option_env!("PERSISTENT_HTTPS_BUILD_LABEL").unwrap_or(env!("CARGO_PKG_VERSION")))
    }

    /// The label text
    pub fn label(&self) -> &str {
        &self.0
    }

    /// Ask a binary on disk for its label
    pub async fn query(binary: &Path) -> io::Result<Self> {
        Self::query_with_timeout(binary, LABEL_QUERY_TIMEOUT).await
    }

    /// Ask a binary on disk for its label, killing it after `limit`
    pub async fn query_with_timeout(binary: &Path, limit: Duration) -> io::Result<Self> {
        let mut cmd = Command::new(binary);
        cmd.arg(PRINT_LABEL_FLAG)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let output = tokio::time::timeout(limit, cmd.output()).await.map_err(|_| {
            io::Error::new(
                io::ErrorKind::TimedOut,
                format!("{:?} {} did not finish within {:?}", binary, PRINT_LABEL_FLAG, limit),
            )
        })??;

        if !output.status.success() {
            return Err(io::Error::other(format!(
                "{:?} {} exited with {}",
                binary, PRINT_LABEL_FLAG, output.status
            )));
        }

        let label = String::from_utf8(output.stdout)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        Ok(Self::new(label.trim()))
    }
}

impl fmt::Display for BuildIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Path of the running executable as it exists on disk
///
/// After the binary is replaced, `current_exe()` on Linux resolves to
/// `"<path> (deleted)"`; the new file lives at `<path>`.
pub fn on_disk_executable() -> io::Result<PathBuf> {
    let exe = std::env::current_exe()?;
    Ok(strip_deleted_suffix(exe))
}

fn strip_deleted_suffix(path: PathBuf) -> PathBuf {
    match path.to_str().and_then(|s| s.strip_suffix(DELETED_SUFFIX)) {
        Some(stripped) => PathBuf::from(stripped),
        None => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn write_script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn test_current_identity_not_empty() {
        assert!(!BuildIdentity::current().label().is_empty());
    }

    #[test]
    fn test_strip_deleted_suffix() {
        assert_eq!(
            strip_deleted_suffix(PathBuf::from("/usr/bin/proxy (deleted)")),
            PathBuf::from("/usr/bin/proxy")
        );
        assert_eq!(
            strip_deleted_suffix(PathBuf::from("/usr/bin/proxy")),
            PathBuf::from("/usr/bin/proxy")
        );
    }

    #[tokio::test]
    async fn test_query_reads_trimmed_label() {
        let dir = TempDir::new().unwrap();
        let bin = write_script(&dir, "labeled", "echo \"  build-42  \"");
        let identity = BuildIdentity::query(&bin).await.unwrap();
        assert_eq!(identity, BuildIdentity::new("build-42"));
    }

    #[tokio::test]
    async fn test_query_failing_binary() {
        let dir = TempDir::new().unwrap();
        let bin = write_script(&dir, "broken", "exit 3");
        assert!(BuildIdentity::query(&bin).await.is_err());
        assert!(BuildIdentity::query(&dir.path().join("missing")).await.is_err());
    }

    #[tokio::test]
    async fn test_query_hung_binary_times_out() {
        let dir = TempDir::new().unwrap();
        let bin = write_script(&dir, "hung", "exec sleep 30");
        let err = BuildIdentity::query_with_timeout(&bin, Duration::from_millis(200))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }
}
