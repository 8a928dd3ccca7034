//! Daemon binary tests
//!
//! Runs git-remote-persistent-https--proxy as a process and checks what a
//! spawning client sees: stdout lines, exit status, signal handling.

use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Child, ChildStdout, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const PROXY_BIN: &str = env!("CARGO_BIN_EXE_git-remote-persistent-https--proxy");

fn proxy() -> Command {
    Command::cargo_bin("git-remote-persistent-https--proxy")
        .expect("Failed to locate proxy binary - ensure it's built before running tests")
}

fn socket_dir(root: &TempDir) -> PathBuf {
    root.path().join("sock")
}

/// A daemon started in the background, killed on drop
struct RunningProxy {
    child: Child,
    stdout: BufReader<ChildStdout>,
}

impl RunningProxy {
    fn start(root: &TempDir) -> Self {
        let mut child = std::process::Command::new(PROXY_BIN)
            .arg("--socket-dir")
            .arg(socket_dir(root))
            .env("XDG_CONFIG_HOME", root.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .unwrap();
        let stdout = BufReader::new(child.stdout.take().unwrap());
        Self { child, stdout }
    }

    fn read_line(&mut self) -> String {
        let mut line = String::new();
        self.stdout.read_line(&mut line).unwrap();
        line
    }

    fn signal(&self, signal: libc::c_int) {
        // SAFETY: the pid belongs to a child we have not reaped yet
        unsafe {
            libc::kill(self.child.id() as libc::pid_t, signal);
        }
    }

    fn wait(&mut self) -> ExitStatus {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(status) = self.child.try_wait().unwrap() {
                return status;
            }
            assert!(Instant::now() < deadline, "proxy did not exit");
            std::thread::sleep(Duration::from_millis(20));
        }
    }
}

impl Drop for RunningProxy {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

#[test]
fn test_print_label() {
    proxy()
        .arg("--print-label")
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_help() {
    proxy()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--socket-dir"));
}

#[test]
fn test_ready_output_names_socket_and_addresses() {
    let root = TempDir::new().unwrap();
    let mut daemon = RunningProxy::start(&root);

    assert_eq!(daemon.read_line(), "OK\n");

    let listening = daemon.read_line();
    let socket = socket_dir(&root).join("persistent-https-proxy-socket");
    assert!(
        listening.starts_with(&format!("Listening on unix socket={} ", socket.display())),
        "unexpected ready line {:?}",
        listening
    );
    assert!(listening.contains(" http=127.0.0.1:"));
    assert!(listening.contains(" https=127.0.0.1:"));

    daemon.signal(libc::SIGTERM);
    assert!(daemon.wait().success());
}

#[test]
fn test_second_instance_reports_already_running() {
    let root = TempDir::new().unwrap();
    let mut daemon = RunningProxy::start(&root);
    assert_eq!(daemon.read_line(), "OK\n");

    proxy()
        .arg("--socket-dir")
        .arg(socket_dir(&root))
        .env("XDG_CONFIG_HOME", root.path())
        .assert()
        .success()
        .stdout("OK\npersistent-https proxy already running\n");

    // The first daemon keeps serving
    assert!(daemon.child.try_wait().unwrap().is_none());
}

#[test]
fn test_fatal_signals_exit_with_status_one() {
    for signal in [libc::SIGINT, libc::SIGHUP, libc::SIGQUIT] {
        let root = TempDir::new().unwrap();
        let mut daemon = RunningProxy::start(&root);
        assert_eq!(daemon.read_line(), "OK\n");

        daemon.signal(signal);
        assert_eq!(daemon.wait().code(), Some(1), "signal {}", signal);
    }
}
