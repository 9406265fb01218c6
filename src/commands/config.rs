use anyhow::Result;

use crate::cli::{Cli, ConfigCommand};
use crate::config::Config;

use super::{print_json, resolve_config};

pub fn run(cli: &Cli, cmd: &ConfigCommand) -> Result<()> {
	match cmd {
		ConfigCommand::Show => show(cli),
		ConfigCommand::Init => init(cli),
	}
}

fn show(cli: &Cli) -> Result<()> {
	let config = resolve_config(cli)?;
	if cli.json {
		return print_json(&config);
	}

	let path = cli.config_file.clone().unwrap_or_else(Config::path);
	println!("Config ({})", path.display());
	println!("  Endpoint:  {}", config.service.endpoint());
	println!("  Timeout:   {} ms", config.service.timeout_ms);
	println!("  Framing:   {:?}", config.service.framing);
	println!("  Max reply: {} bytes", config.service.max_response_bytes);
	println!("  Parallel:  {}", config.scenarios.parallel);
	println!("  Retries:   {}", config.scenarios.retries);
	Ok(())
}

fn init(cli: &Cli) -> Result<()> {
	let path = cli.config_file.clone().unwrap_or_else(Config::path);
	if path.exists() {
		println!("Config already exists at {}", path.display());
		return Ok(());
	}
	Config::default().save_to(&path)?;
	println!("Wrote default config to {}", path.display());
	Ok(())
}
