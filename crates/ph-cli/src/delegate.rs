//! Running the remote helper that does the actual transfer

use std::io;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Stdio};

use tokio::process::Command;

/// Proxy address variable read by the delegate
pub const PROXY_ENV: &str = "http_proxy";

/// Set when the proxy upgrades to TLS, so credential helpers treat the
/// plain-looking URL as secure
pub const SECURE_ENV: &str = "GIT_PERSISTENT_HTTPS_SECURE";

/// How the delegate finished
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelegateOutcome {
    /// Exit code zero
    Success,
    /// Nonzero exit code
    Exited(i32),
    /// Killed by a signal
    Signaled(i32),
}

impl From<ExitStatus> for DelegateOutcome {
    fn from(status: ExitStatus) -> Self {
        match (status.code(), status.signal()) {
            (Some(0), _) => Self::Success,
            (Some(code), _) => Self::Exited(code),
            (None, Some(signal)) => Self::Signaled(signal),
            // Neither code nor signal only happens for stopped processes,
            // which `wait` does not report
            (None, None) => Self::Exited(1),
        }
    }
}

/// A delegate process bound to a proxy address
#[derive(Debug, Clone)]
pub struct Delegate {
    program: String,
    args: Vec<String>,
    proxy: String,
    insecure: bool,
}

impl Delegate {
    /// Delegate `program` with `args`, pointed at the proxy at `proxy`
    pub fn new(program: impl Into<String>, args: Vec<String>, proxy: impl Into<String>, insecure: bool) -> Self {
        Self {
            program: program.into(),
            args,
            proxy: proxy.into(),
            insecure,
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .env(PROXY_ENV, &self.proxy)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        if self.insecure {
            cmd.env_remove(SECURE_ENV);
        } else {
            cmd.env(SECURE_ENV, "1");
        }
        cmd
    }

    /// Run to completion with the helper's stdio
    pub async fn run(&self) -> io::Result<DelegateOutcome> {
        tracing::debug!(program = %self.program, proxy = %self.proxy, "Running delegate");
        let status = self.command().status().await?;
        Ok(status.into())
    }
}
