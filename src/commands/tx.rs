use anyhow::Result;
use tracing::info;

use crate::cli::{Cli, TxCommand};
use crate::methods::TxSendParams;

use super::{finish_call, render_value, resolve_client};

pub async fn run(cli: &Cli, cmd: &TxCommand) -> Result<()> {
	let rpc = resolve_client(cli)?;

	match cmd {
		TxCommand::Send {
			from,
			to,
			value,
			data,
		} => {
			let tx = TxSendParams {
				from: from.clone(),
				to: to.clone(),
				value: value.clone(),
				data: data.strip_prefix("0x").unwrap_or(data).to_owned(),
			};
			if tx.to.is_empty() {
				info!(%from, "sending contract creation");
			}
			let outcome = rpc.tx_send(&tx).await;
			finish_call(cli, outcome, render_value)
		}
	}
}
