//! End-to-end tests through real TCP connections.
//!
//! Most tests run against an in-process stub of the simulator service. The
//! live-service test is marked `#[ignore]`; start the service on
//! 127.0.0.1:8000 and run it explicitly with:
//!
//!   cargo test --test integration -- --ignored

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};

use ethsim_harness::abi::{self, AbiType, AbiValue};
use ethsim_harness::codec::{FailureCode, RpcOutcome, RpcRequest};
use ethsim_harness::config::ServiceConfig;
use ethsim_harness::fixtures::{self, BALANCE_OF, BOB, JACK, TRANSFER, TRANSFER_AMOUNT};
use ethsim_harness::methods::{Account, Method};
use ethsim_harness::mock::StubService;
use ethsim_harness::rpc::RpcClient;
use ethsim_harness::scenario::{FailurePolicy, Scenario, ScenarioRunner, ScenarioStep, StepOutcome};

const INITIAL_SUPPLY: u128 = 1000;

/// Just enough of the simulator to drive the fixture scenarios.
#[derive(Default)]
struct Simulator {
	accounts: Vec<Account>,
	/// contract address -> holder address -> balance
	tokens: BTreeMap<String, BTreeMap<String, u128>>,
	deployed: usize,
}

impl Simulator {
	fn handle(&mut self, request: RpcRequest) -> RpcOutcome {
		let param = |name: &str| {
			request
				.params
				.get(name)
				.and_then(Value::as_str)
				.unwrap_or_default()
				.to_owned()
		};

		match request.method.as_str() {
			"account_add" => {
				let name = param("name");
				let address = match name.as_str() {
					"bob" => BOB.address.to_owned(),
					"jack" => JACK.address.to_owned(),
					other => format!("0x{:0>40}", hex::encode(other.as_bytes())),
				};
				let account = Account { name, address };
				if !self.accounts.contains(&account) {
					self.accounts.push(account.clone());
				}
				RpcOutcome::Success {
					result: json!(account),
				}
			}
			"account_list" => RpcOutcome::Success {
				result: json!(self.accounts),
			},
			"contract_deploy" | "tx_send" => {
				self.deployed += 1;
				let address = format!("0x{:040x}", 0xc0de_0000 + self.deployed);
				let from = param("from");
				self.tokens
					.insert(address.clone(), BTreeMap::from([(from, INITIAL_SUPPLY)]));
				RpcOutcome::Success {
					result: json!({ "address": address }),
				}
			}
			"contract_call" => self.call(&param("from"), &param("contract"), &param("input")),
			other => RpcOutcome::application(format!("unknown method {other}")),
		}
	}

	fn call(&mut self, from: &str, contract: &str, input: &str) -> RpcOutcome {
		let Some(balances) = self.tokens.get_mut(contract) else {
			return RpcOutcome::application("NotExistedAddress: no contract at that address");
		};

		if let Ok(args) = abi::decode_call(TRANSFER, &[AbiType::Address, AbiType::Uint(256)], input) {
			let (AbiValue::Address(to), AbiValue::Uint(amount)) = (&args[0], &args[1]) else {
				return RpcOutcome::application("VMError: bad arguments");
			};
			let held = balances.get(from).copied().unwrap_or(0);
			if held < *amount {
				return RpcOutcome::application("NotEnoughBalance: insufficient tokens");
			}
			balances.insert(from.to_owned(), held - amount);
			*balances.entry(format!("0x{}", hex::encode(to))).or_default() += amount;
			return RpcOutcome::Success {
				result: json!(abi::encode_args(&[AbiType::Bool], &[AbiValue::Bool(true)]).unwrap()),
			};
		}

		if let Ok(args) = abi::decode_call(BALANCE_OF, &[AbiType::Address], input) {
			let AbiValue::Address(holder) = &args[0] else {
				return RpcOutcome::application("VMError: bad arguments");
			};
			let balance = balances
				.get(&format!("0x{}", hex::encode(holder)))
				.copied()
				.unwrap_or(0);
			return RpcOutcome::Success {
				result: json!(abi::encode_args(&[AbiType::Uint(256)], &[AbiValue::Uint(balance)]).unwrap()),
			};
		}

		RpcOutcome::application("VMError: unknown selector")
	}
}

async fn spawn_simulator() -> StubService {
	let state = Arc::new(Mutex::new(Simulator::default()));
	StubService::spawn(move |request| state.lock().unwrap().handle(request))
		.await
		.expect("failed to bind stub service")
}

fn client_for(stub: &StubService) -> RpcClient {
	let endpoint = stub.endpoint();
	RpcClient::from_config(&ServiceConfig {
		host: endpoint.host,
		port: endpoint.port,
		..ServiceConfig::default()
	})
}

fn balance_of(outcome: &StepOutcome) -> u128 {
	let StepOutcome::Success { result } = outcome else {
		panic!("expected success, got {outcome}");
	};
	let values = abi::decode_args(&[AbiType::Uint(256)], result.as_str().unwrap()).unwrap();
	match values[0] {
		AbiValue::Uint(v) => v,
		ref other => panic!("expected uint, got {other:?}"),
	}
}

#[tokio::test]
async fn account_add_then_list() {
	let stub = spawn_simulator().await;
	let rpc = client_for(&stub);

	let added = rpc.account_add("bob").await;
	let account = Account::from_result(added.result().unwrap()).unwrap();
	assert_eq!(account.address, BOB.address);

	let listed = rpc.account_list().await;
	let accounts = Account::list_from_result(listed.result().unwrap());
	assert!(accounts.contains(&account));
	assert_eq!(stub.connections(), 2, "one connection per call");
}

#[tokio::test]
async fn account_list_is_idempotent() {
	let stub = spawn_simulator().await;
	let rpc = client_for(&stub);
	rpc.account_add("jack").await;

	let first = rpc.account_list().await;
	let second = rpc.account_list().await;
	assert!(first.is_success());
	assert_eq!(first, second);
}

#[tokio::test]
async fn multi_megabyte_result_arrives_intact() {
	let accounts: Vec<Value> = (0..50_000)
		.map(|i| json!({ "name": format!("user-{i}"), "address": format!("0x{i:040x}") }))
		.collect();
	let expected = Value::Array(accounts);
	let reply = expected.clone();
	let stub = StubService::spawn(move |_| RpcOutcome::Success {
		result: reply.clone(),
	})
	.await
	.unwrap();

	let outcome = client_for(&stub).account_list().await;
	assert!(expected.to_string().len() > 4 * 1024 * 1024);
	assert_eq!(outcome.result(), Some(&expected));
}

#[tokio::test]
async fn token_cycle_moves_funds() {
	let stub = spawn_simulator().await;
	let runner = ScenarioRunner::new(client_for(&stub));

	let report = runner.run(&fixtures::token_cycle(BOB, JACK).unwrap()).await;
	assert!(report.passed(), "{report}");
	assert_eq!(report.succeeded(), report.steps.len());

	let contracts = report.contracts();
	assert_eq!(contracts.len(), 1);
	assert_eq!(contracts[0].name, fixtures::TOKEN.name);
	assert_eq!(contracts[0].deployed_at, 0);

	let balance = |label| balance_of(&report.step(label).unwrap().outcome);
	assert_eq!(balance("balance-sender"), INITIAL_SUPPLY - TRANSFER_AMOUNT);
	assert_eq!(balance("balance-recipient"), TRANSFER_AMOUNT);
	assert_eq!(balance("balance-contract"), 0);

	// The deployed address flowed into every later call.
	let token = &contracts[0].address;
	for step in &report.steps[1..] {
		let request = step.request.as_ref().unwrap();
		assert_eq!(request.params["contract"], json!(token));
	}
}

#[tokio::test]
async fn every_fixture_passes_in_parallel() {
	let stub = spawn_simulator().await;
	let runner = ScenarioRunner::new(client_for(&stub));

	let reports = runner.run_all(fixtures::all().unwrap(), true).await;
	let names: Vec<_> = reports.iter().map(|r| r.scenario.as_str()).collect();
	assert_eq!(names, fixtures::NAMES);
	for report in &reports {
		assert!(report.passed(), "{report}");
	}
}

#[tokio::test]
async fn abort_stops_before_further_connections() {
	let stub = spawn_simulator().await;
	let runner = ScenarioRunner::new(client_for(&stub));

	let scenario = Scenario::builder("missing-contract")
		.step(
			ScenarioStep::new("call", Method::ContractCall)
				.param("from", BOB.address)
				.param("contract", "0x0000000000000000000000000000000000000001")
				.param("input", "901717d1"),
		)
		.step(ScenarioStep::new("list", Method::AccountList))
		.build()
		.unwrap();

	let report = runner.run(&scenario).await;
	assert!(!report.passed());
	match &report.steps[0].outcome {
		StepOutcome::Failed { code, message } => {
			assert_eq!(*code, FailureCode::Application);
			assert!(message.starts_with("NotExistedAddress"), "{message}");
		}
		other => panic!("unexpected outcome {other}"),
	}
	assert!(report.steps[1].outcome.is_not_run());
	assert_eq!(stub.connections(), 1);
}

#[tokio::test]
async fn unreachable_service_is_a_network_failure() {
	let stub = spawn_simulator().await;
	let rpc = client_for(&stub);
	drop(stub);
	// Give the aborted accept loop a moment to release the port.
	tokio::time::sleep(std::time::Duration::from_millis(50)).await;

	let scenario = Scenario::builder("offline")
		.step(ScenarioStep::new("list", Method::AccountList).on_failure(FailurePolicy::Continue))
		.build()
		.unwrap();
	let report = ScenarioRunner::new(rpc).run(&scenario).await;

	assert!(matches!(
		report.steps[0].outcome,
		StepOutcome::Failed {
			code: FailureCode::Network,
			..
		}
	));
	assert!(report.passed(), "Continue failures are tolerated");
}

#[tokio::test]
#[ignore]
async fn live_service_runs_every_fixture() {
	let rpc = RpcClient::from_config(&ServiceConfig::default());
	let reports = ScenarioRunner::new(rpc)
		.run_all(fixtures::all().unwrap(), false)
		.await;
	for report in &reports {
		println!("{report}");
		assert!(report.passed());
	}
}
