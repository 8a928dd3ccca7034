//! git-remote-persistent-https
//!
//! Invoked by git for `persistent-https://` and `persistent-http://`
//! remotes. stdout and stdin belong to the remote helper protocol spoken
//! by the delegate, so all diagnostics go to stderr.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ph_cli::{Coordinator, DelegateOutcome, RemoteInvocation};
use ph_core::config;
use ph_core::BuildIdentity;

#[derive(Parser)]
#[command(name = "git-remote-persistent-https")]
#[command(version, about = "Git remote helper routing persistent-https:// through a local proxy")]
struct Args {
    /// Remote name and URL, as passed by git
    #[arg(value_name = "REMOTE")]
    args: Vec<String>,

    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the build label and exit
    #[arg(long)]
    print_label: bool,

    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_label {
        println!("{}", BuildIdentity::current());
        return Ok(());
    }

    let log_level = match (args.quiet, args.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        (false, _) => "trace",
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.into()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let invocation = RemoteInvocation::parse(&args.args)?;

    let config_file = config::load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;
    let coordinator = Coordinator::from_config(&config_file, args.config.as_deref())?;

    match coordinator.run(&invocation).await? {
        DelegateOutcome::Success => Ok(()),
        DelegateOutcome::Exited(code) => std::process::exit(code),
        DelegateOutcome::Signaled(signal) => {
            anyhow::bail!("{} was killed by signal {}", config_file.client.delegate, signal)
        }
    }
}
