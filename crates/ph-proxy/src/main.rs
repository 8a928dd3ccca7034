//! persistent-https proxy daemon
//!
//! Spawned by `git-remote-persistent-https` on first use. Prints `OK` on
//! stdout once it is ready (or once it finds another daemon already
//! serving), then a line with the socket path and proxy addresses, and
//! keeps running in the background.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ph_core::config;
use ph_core::identity::on_disk_executable;
use ph_core::BuildIdentity;
use ph_protocol::{ALREADY_RUNNING_LINE, READY_LINE};
use ph_proxy::{monitor, Daemon, StartOutcome};

#[derive(Parser)]
#[command(name = "git-remote-persistent-https--proxy")]
#[command(about = "persistent-https proxy daemon")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory holding the proxy socket (overrides config)
    #[arg(long)]
    socket_dir: Option<PathBuf>,

    /// Shut down after this many seconds without a session (overrides config)
    #[arg(long, value_name = "SECS")]
    max_idle_duration: Option<u64>,

    /// Seconds between checks for a replaced binary (overrides config)
    #[arg(long, value_name = "SECS")]
    poll_update_interval: Option<u64>,

    /// Print the build label and exit
    #[arg(long)]
    print_label: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Write startup lines for the spawning client
///
/// The client may stop reading after the first line, so write errors are ignored.
fn announce(lines: &[&str]) {
    let mut stdout = std::io::stdout().lock();
    for line in lines {
        let _ = writeln!(stdout, "{}", line);
    }
    let _ = stdout.flush();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_label {
        println!("{}", BuildIdentity::current());
        return Ok(());
    }

    // Initialize logging; stdout is reserved for the ready line
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| args.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config_file = config::load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(dir) = args.socket_dir {
        config_file.socket_dir = Some(dir);
    }
    let socket = config_file.socket_guard()?;

    let mut proxy_config = config_file.proxy;
    if let Some(secs) = args.max_idle_duration {
        proxy_config.max_idle_duration = Duration::from_secs(secs);
    }
    if let Some(secs) = args.poll_update_interval {
        proxy_config.poll_update_interval = Duration::from_secs(secs);
    }

    let identity = BuildIdentity::current();
    tracing::info!("persistent-https proxy {} starting", identity);

    let daemon = match Daemon::start(proxy_config, socket, identity).await? {
        StartOutcome::AlreadyRunning => {
            announce(&[READY_LINE, ALREADY_RUNNING_LINE]);
            return Ok(());
        }
        StartOutcome::Started(daemon) => daemon,
    };

    let binary = on_disk_executable().context("Failed to locate own executable")?;
    monitor::spawn_all(daemon.state(), binary).context("Failed to install signal handlers")?;

    let listening = daemon.listening_line();
    announce(&[READY_LINE, listening.as_str()]);

    daemon.run().await?;

    tracing::info!("Proxy shutdown complete");
    Ok(())
}
