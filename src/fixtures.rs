//! Known accounts, contracts and the scenarios built from them.
//!
//! Everything here is data. A new integration scenario is a new function
//! returning a [`Scenario`], plus an entry in [`NAMES`].

use std::time::Duration;

use crate::abi::{AbiType, AbiValue, Selector};
use crate::methods::Method;
use crate::scenario::{AbiArg, FailurePolicy, Scenario, ScenarioError, ScenarioStep, Template};

/// An account the simulator derives deterministically from its name.
#[derive(Debug, Clone, Copy)]
pub struct AccountFixture {
	pub name: &'static str,
	pub address: &'static str,
}

pub const BOB: AccountFixture = AccountFixture {
	name: "bob",
	address: "0xc86e8742966300101238f1a5eb834530bbc7689a",
};

pub const JACK: AccountFixture = AccountFixture {
	name: "jack",
	address: "0x93746dcfda94c0566ac76dc7255ce526c94122a3",
};

/// A contract source the service can compile and deploy.
#[derive(Debug, Clone, Copy)]
pub struct ContractFixture {
	pub name: &'static str,
	pub file: &'static str,
}

pub const TOKEN: ContractFixture = ContractFixture {
	name: "token",
	file: "contracts/Token.sol",
};

/// `transfer(address,uint256)`
pub const TRANSFER: Selector = Selector([0xa9, 0x05, 0x9c, 0xbb]);
/// `balanceOf(address)`
pub const BALANCE_OF: Selector = Selector([0x70, 0xa0, 0x82, 0x31]);

pub const TRANSFER_AMOUNT: u128 = 100;

/// Init code of a contract whose single function `0x901717d1` returns 1.
pub const GETTER_INIT_CODE: &str = "608060405234801561001057600080fd5b5060b68061001f6000396000f3fe6080604052348015600f57600080fd5b506004361060285760003560e01c8063901717d114602d575b600080fd5b60336047565b604051603e91906067565b60405180910390f35b60006001905090565b6000819050919050565b6061816050565b82525050565b6000602082019050607a6000830184605a565b9291505056fea26469706673582212208237f441dea9dad1ed0b8161380ea48ff7cab71e3524abc1f52cf551d5e220e764736f6c634300080f0033";

/// Deployments compile source on the service side and may be slow.
const DEPLOY_TIMEOUT: Duration = Duration::from_secs(30);

pub const NAMES: [&str; 5] = [
	"account-bootstrap",
	"token-cycle-bob-jack",
	"token-cycle-jack-bob",
	"account-listing",
	"raw-creation",
];

/// Build a named scenario.
pub fn by_name(name: &str) -> Option<Result<Scenario, ScenarioError>> {
	match name {
		"account-bootstrap" => Some(account_bootstrap()),
		"token-cycle-bob-jack" => Some(token_cycle(BOB, JACK)),
		"token-cycle-jack-bob" => Some(token_cycle(JACK, BOB)),
		"account-listing" => Some(account_listing()),
		"raw-creation" => Some(raw_creation()),
		_ => None,
	}
}

pub fn all() -> Result<Vec<Scenario>, ScenarioError> {
	NAMES
		.iter()
		.filter_map(|name| by_name(name))
		.collect()
}

/// Register both fixture accounts, then list them.
pub fn account_bootstrap() -> Result<Scenario, ScenarioError> {
	let mut builder = Scenario::builder("account-bootstrap")
		.description("create the fixture accounts and list them");
	for account in [BOB, JACK] {
		builder = builder.step(
			ScenarioStep::new(format!("add-{}", account.name), Method::AccountAdd)
				.param("name", account.name)
				.capture(format!("{}_address", account.name), "/address"),
		);
	}
	builder
		.step(ScenarioStep::new("list", Method::AccountList).on_failure(FailurePolicy::Continue))
		.build()
}

/// Deploy the token from `sender`, move funds to `recipient`, then check
/// both balances and the contract's own.
pub fn token_cycle(
	sender: AccountFixture,
	recipient: AccountFixture,
) -> Result<Scenario, ScenarioError> {
	let invalid = |step: usize, label: &str| {
		let label = label.to_owned();
		move |source| ScenarioError::InvalidArgument { step, label, source }
	};
	let recipient_arg =
		AbiArg::parse(AbiType::Address, recipient.address).map_err(invalid(1, "transfer"))?;
	let amount_arg = AbiArg::value(AbiType::Uint(256), AbiValue::Uint(TRANSFER_AMOUNT))
		.map_err(invalid(1, "transfer"))?;
	let sender_arg =
		AbiArg::parse(AbiType::Address, sender.address).map_err(invalid(2, "balance-sender"))?;

	let call = |label: &str, input: Template| {
		ScenarioStep::new(label, Method::ContractCall)
			.param("from", sender.address)
			.param("contract", Template::binding(TOKEN.name))
			.param("input", input)
	};

	Scenario::builder(format!("token-cycle-{}-{}", sender.name, recipient.name))
		.description(format!(
			"deploy {} from {}, transfer {} to {}, verify balances",
			TOKEN.name, sender.name, TRANSFER_AMOUNT, recipient.name
		))
		.step(
			ScenarioStep::new("deploy", Method::ContractDeploy)
				.param("from", sender.address)
				.param("contract_file", TOKEN.file)
				.capture(TOKEN.name, "/address")
				.timeout(DEPLOY_TIMEOUT),
		)
		.step(call(
			"transfer",
			Template::abi_call(TRANSFER, [recipient_arg.clone(), amount_arg]),
		))
		.step(
			call("balance-sender", Template::abi_call(BALANCE_OF, [sender_arg]))
				.on_failure(FailurePolicy::Continue),
		)
		.step(
			call("balance-recipient", Template::abi_call(BALANCE_OF, [recipient_arg]))
				.on_failure(FailurePolicy::Continue),
		)
		.step(
			call(
				"balance-contract",
				Template::abi_call(BALANCE_OF, [AbiArg::bound(TOKEN.name, AbiType::Address)]),
			)
			.on_failure(FailurePolicy::Continue),
		)
		.build()
}

/// Two independent listings; with no mutation in between they must agree.
pub fn account_listing() -> Result<Scenario, ScenarioError> {
	Scenario::builder("account-listing")
		.description("list accounts twice")
		.step(
			ScenarioStep::new("list-1", Method::AccountList)
				.capture("listing", "")
				.on_failure(FailurePolicy::Continue),
		)
		.step(ScenarioStep::new("list-2", Method::AccountList).on_failure(FailurePolicy::Continue))
		.build()
}

/// A creation transaction: empty `to`, init code as `data`.
pub fn raw_creation() -> Result<Scenario, ScenarioError> {
	Scenario::builder("raw-creation")
		.description("send a contract-creation transaction from bob")
		.step(
			ScenarioStep::new("create", Method::TxSend)
				.param("from", BOB.address)
				.param("to", "")
				.param("value", "0")
				.param("data", GETTER_INIT_CODE),
		)
		.build()
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::abi;

	#[test]
	fn every_named_scenario_builds() {
		let scenarios = all().unwrap();
		assert_eq!(scenarios.len(), NAMES.len());
		for (scenario, name) in scenarios.iter().zip(NAMES) {
			assert_eq!(scenario.name(), name);
			assert!(!scenario.steps().is_empty());
		}
		assert!(by_name("nope").is_none());
	}

	#[test]
	fn fixture_addresses_are_valid() {
		for account in [BOB, JACK] {
			let hex = account.address.strip_prefix("0x").unwrap();
			assert_eq!(hex.len(), 40, "address should be 20 bytes");
			assert!(hex::decode(hex).is_ok());
		}
		assert!(hex::decode(GETTER_INIT_CODE).is_ok());
	}

	#[test]
	fn transfer_input_decodes_to_recipient_and_amount() {
		let scenario = token_cycle(BOB, JACK).unwrap();
		let transfer = &scenario.steps()[1];
		let input = transfer.params["input"].resolve(&Default::default()).unwrap();

		let decoded = abi::decode_call(
			TRANSFER,
			&[AbiType::Address, AbiType::Uint(256)],
			input.as_str().unwrap(),
		)
		.unwrap();
		assert_eq!(
			decoded,
			[AbiValue::address(JACK.address).unwrap(), AbiValue::Uint(TRANSFER_AMOUNT)]
		);
	}

	#[test]
	fn token_cycle_depends_on_deploy() {
		let scenario = token_cycle(JACK, BOB).unwrap();
		for step in &scenario.steps()[1..] {
			assert!(step.required_bindings().contains(TOKEN.name), "{}", step.label);
		}
	}
}
