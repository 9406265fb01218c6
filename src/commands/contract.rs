use anyhow::{Context, Result};

use crate::abi::{self, AbiType, AbiValue, Selector};
use crate::cli::{CallInput, Cli, ContractCommand};
use crate::methods::ContractHandle;

use super::{finish_call, render_value, resolve_client};

pub async fn run(cli: &Cli, cmd: &ContractCommand) -> Result<()> {
	let rpc = resolve_client(cli)?;

	match cmd {
		ContractCommand::Deploy { from, file } => {
			let outcome = rpc.contract_deploy(from, file).await;
			finish_call(cli, outcome, |result| {
				match ContractHandle::from_deploy_result(file, 0, result) {
					Some(handle) => println!("Deployed {} at {}", handle.name, handle.address),
					None => render_value(result),
				}
			})
		}
		ContractCommand::Call {
			from,
			contract,
			input,
			args,
		} => {
			let input = call_input(input, args)?;
			let outcome = rpc.contract_call(from, contract, &input).await;
			finish_call(cli, outcome, render_value)
		}
	}
}

/// Turn `--input` or `--selector`/`--arg` into the bare-hex call input.
fn call_input(input: &CallInput, args: &[String]) -> Result<String> {
	if let Some(raw) = &input.input {
		let raw = raw.strip_prefix("0x").unwrap_or(raw);
		hex::decode(raw).with_context(|| format!("--input is not hex: {raw}"))?;
		return Ok(raw.to_ascii_lowercase());
	}

	let selector: Selector = input
		.selector
		.as_deref()
		.context("either --input or --selector is required")?
		.parse()?;
	let (types, values): (Vec<_>, Vec<_>) = args
		.iter()
		.map(|arg| parse_arg(arg))
		.collect::<Result<Vec<_>>>()?
		.into_iter()
		.unzip();
	Ok(abi::encode(selector, &types, &values)?)
}

/// Parse one `TYPE:VALUE` argument. The value is everything after the
/// first colon, untrimmed.
fn parse_arg(arg: &str) -> Result<(AbiType, AbiValue)> {
	let (ty, value) = arg
		.split_once(':')
		.with_context(|| format!("argument {arg:?} is not TYPE:VALUE"))?;
	let ty: AbiType = ty.trim().parse()?;
	let value = AbiValue::parse(&ty, value).with_context(|| format!("argument {arg:?}"))?;
	Ok((ty, value))
}
