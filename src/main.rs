use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use ethsim_harness::cli::{Cli, Command};
use ethsim_harness::commands;

#[tokio::main]
async fn main() -> Result<()> {
	// Logs go to stderr; stdout carries results and reports.
	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
		)
		.with_writer(std::io::stderr)
		.init();

	let cli = Cli::parse();

	match &cli.command {
		Command::Account { command } => commands::account::run(&cli, command).await,
		Command::Contract { command } => commands::contract::run(&cli, command).await,
		Command::Tx { command } => commands::tx::run(&cli, command).await,
		Command::Scenario { command } => commands::scenario::run(&cli, command).await,
		Command::Config { command } => commands::config::run(&cli, command),
	}
}
