use anyhow::Result;

use crate::cli::{AccountCommand, Cli};
use crate::methods::Account;

use super::{finish_call, render_value, resolve_client};

pub async fn run(cli: &Cli, cmd: &AccountCommand) -> Result<()> {
	let rpc = resolve_client(cli)?;

	match cmd {
		AccountCommand::Add { name } => {
			let outcome = rpc.account_add(name).await;
			finish_call(cli, outcome, |result| match Account::from_result(result) {
				Some(account) => println!("{}  {}", account.name, account.address),
				None => render_value(result),
			})
		}
		AccountCommand::List => {
			let outcome = rpc.account_list().await;
			finish_call(cli, outcome, print_accounts)
		}
	}
}

fn print_accounts(result: &serde_json::Value) {
	let accounts = Account::list_from_result(result);
	if accounts.is_empty() {
		println!("No accounts.");
		return;
	}
	for account in &accounts {
		println!("{:<16} {}", account.name, account.address);
	}
	println!("\n{} account(s) total.", accounts.len());
}
