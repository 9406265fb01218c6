use anyhow::Result;
use serde_json::json;
use tracing::warn;

use crate::cli::{Cli, ScenarioCommand};
use crate::fixtures;
use crate::rpc::RpcClient;
use crate::scenario::{Scenario, ScenarioReport, ScenarioRunner};

use super::{print_json, resolve_config};

pub async fn run(cli: &Cli, cmd: &ScenarioCommand) -> Result<()> {
	match cmd {
		ScenarioCommand::List => list(cli),
		ScenarioCommand::Run {
			names,
			all,
			parallel,
			retries,
		} => {
			let config = resolve_config(cli)?;
			let scenarios = if *all {
				fixtures::all()?
			} else {
				select(names)?
			};
			let runner = ScenarioRunner::new(RpcClient::from_config(&config.service))
				.with_min_retries(retries.unwrap_or(config.scenarios.retries));
			let parallel = *parallel || config.scenarios.parallel;

			let reports = tokio::select! {
				reports = runner.run_all(scenarios, parallel) => reports,
				_ = tokio::signal::ctrl_c() => {
					warn!("interrupted; in-flight calls dropped");
					anyhow::bail!("interrupted");
				}
			};
			report(cli, &reports)
		}
	}
}

fn list(cli: &Cli) -> Result<()> {
	let scenarios = fixtures::all()?;
	if cli.json {
		let listing: Vec<_> = scenarios
			.iter()
			.map(|s| {
				json!({
					"name": s.name(),
					"description": s.description(),
					"steps": s.steps().len(),
				})
			})
			.collect();
		return print_json(&listing);
	}

	for s in &scenarios {
		println!("{:<24} {:>2} steps  {}", s.name(), s.steps().len(), s.description());
	}
	Ok(())
}

/// Build the named scenarios, failing on the first unknown name.
fn select(names: &[String]) -> Result<Vec<Scenario>> {
	names
		.iter()
		.map(|name| -> Result<Scenario> {
			match fixtures::by_name(name) {
				Some(scenario) => Ok(scenario?),
				None => anyhow::bail!(
					"unknown scenario {name:?}; available: {}",
					fixtures::NAMES.join(", ")
				),
			}
		})
		.collect()
}

fn report(cli: &Cli, reports: &[ScenarioReport]) -> Result<()> {
	if cli.json {
		print_json(&reports)?;
	} else {
		for r in reports {
			println!("{r}");
			for contract in r.contracts() {
				println!("  contract {} at {}", contract.name, contract.address);
			}
		}
	}

	let failed = reports.iter().filter(|r| !r.passed()).count();
	if failed > 0 {
		anyhow::bail!("{failed} of {} scenario(s) failed", reports.len());
	}
	Ok(())
}
