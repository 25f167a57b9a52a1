//! The cluster daemon: one process, one or more roles, started from a YAML
//! config file with a handful of CLI overrides for first join.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use teleport::JoinParams;
use teleport_core::Config;
use tracing::error;

#[derive(Parser)]
#[command(name = "teleport", about = "Run a teleport Auth/Proxy/Node process")]
struct Cli {
	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand)]
enum Command {
	/// Start the process with the given config.
	Start {
		#[arg(long)]
		config: PathBuf,
		/// Redeems a provisioning token on first start; ignored once an
		/// identity already exists on disk.
		#[arg(long)]
		token: Option<String>,
	},
}

#[tokio::main]
async fn main() {
	if let Err(e) = run().await {
		error!(error = ?e, "fatal error during startup");
		eprintln!("teleport: {e:#}");
		std::process::exit(1);
	}
}

async fn run() -> anyhow::Result<()> {
	let cli = Cli::parse();
	let Command::Start { config, token } = cli.command;

	let raw = fs_err::read_to_string(&config).context("reading config file")?;
	let config = Config::from_yaml(&raw).context("parsing config file")?;

	teleport::runtime::init_logging(&config);

	let shutdown = Arc::new(AtomicBool::new(false));
	let shutdown_for_signal = shutdown.clone();
	tokio::spawn(async move {
		let _ = tokio::signal::ctrl_c().await;
		shutdown_for_signal.store(true, std::sync::atomic::Ordering::Relaxed);
	});

	teleport::run(config, JoinParams { provisioning_token: token }, shutdown).await
}
