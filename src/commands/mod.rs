pub mod account;
pub mod config;
pub mod contract;
pub mod scenario;
pub mod tx;

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;

use crate::cli::Cli;
use crate::codec::RpcOutcome;
use crate::config::Config;
use crate::rpc::RpcClient;

/// Load the config file named by `--config` (or the default one) and apply
/// the connection flags on top.
pub fn resolve_config(cli: &Cli) -> Result<Config> {
	let mut config = match &cli.config_file {
		Some(path) => Config::load_from(path)?,
		None => Config::load()?,
	};
	if let Some(host) = &cli.host {
		config.service.host = host.clone();
	}
	if let Some(port) = cli.port {
		config.service.port = port;
	}
	if let Some(ms) = cli.timeout_ms {
		config.service.timeout_ms = ms;
	}
	Ok(config)
}

pub fn resolve_client(cli: &Cli) -> Result<RpcClient> {
	Ok(RpcClient::from_config(&resolve_config(cli)?.service))
}

/// Print the result of a one-shot call, or fail with the service's message.
pub fn finish_call(cli: &Cli, outcome: RpcOutcome, render: impl Fn(&Value)) -> Result<()> {
	if cli.json {
		print_json(&outcome)?;
	}
	match outcome {
		RpcOutcome::Success { result } => {
			if !cli.json {
				render(&result);
			}
			Ok(())
		}
		RpcOutcome::Failure { code, message } => {
			anyhow::bail!("{code:?} failure: {message}")
		}
	}
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
	println!("{}", serde_json::to_string_pretty(value)?);
	Ok(())
}

/// Human rendering of an arbitrary result value.
pub fn render_value(value: &Value) {
	match value {
		Value::Null => println!("ok"),
		Value::String(s) => println!("{s}"),
		other => println!(
			"{}",
			serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string())
		),
	}
}
