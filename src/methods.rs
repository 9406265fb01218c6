use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Methods the simulator service dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
	AccountAdd,
	AccountList,
	ContractDeploy,
	ContractCall,
	TxSend,
}

impl Method {
	pub const ALL: [Method; 5] = [
		Self::AccountAdd,
		Self::AccountList,
		Self::ContractDeploy,
		Self::ContractCall,
		Self::TxSend,
	];

	pub fn as_str(&self) -> &'static str {
		match self {
			Self::AccountAdd => "account_add",
			Self::AccountList => "account_list",
			Self::ContractDeploy => "contract_deploy",
			Self::ContractCall => "contract_call",
			Self::TxSend => "tx_send",
		}
	}

	/// Parameter fields the service expects for this method.
	pub fn required_params(&self) -> &'static [&'static str] {
		match self {
			Self::AccountAdd => &["name"],
			Self::AccountList => &[],
			Self::ContractDeploy => &["from", "contract_file"],
			Self::ContractCall => &["from", "contract", "input"],
			Self::TxSend => &["from", "to", "value", "data"],
		}
	}
}

impl fmt::Display for Method {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for Method {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::ALL
			.into_iter()
			.find(|m| m.as_str() == s)
			.ok_or_else(|| format!("unknown method {s:?}"))
	}
}

// -- Parameters --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountAddParams {
	pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractDeployParams {
	pub from: String,
	pub contract_file: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractCallParams {
	pub from: String,
	pub contract: String,
	/// Selector plus encoded arguments, bare hex.
	pub input: String,
}

/// A raw transaction. An empty `to` makes it a contract creation whose
/// init code is `data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxSendParams {
	pub from: String,
	#[serde(default)]
	pub to: String,
	pub value: String,
	#[serde(default)]
	pub data: String,
}

/// Serialize a parameter struct into the named-parameter object a request
/// carries.
pub fn to_params<P: Serialize>(params: &P) -> Map<String, Value> {
	match serde_json::to_value(params) {
		Ok(Value::Object(map)) => map,
		_ => Map::new(),
	}
}

// -- Results --

/// An account as the service reports it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Account {
	pub name: String,
	pub address: String,
}

impl Account {
	/// Read the account record from an `account_add` result.
	pub fn from_result(result: &Value) -> Option<Self> {
		Some(Self {
			name: result.get("name")?.as_str()?.to_owned(),
			address: result.get("address")?.as_str()?.to_owned(),
		})
	}

	/// Read every record from an `account_list` result, skipping entries
	/// that lack a name or address.
	pub fn list_from_result(result: &Value) -> Vec<Self> {
		result
			.as_array()
			.map(|items| items.iter().filter_map(Self::from_result).collect())
			.unwrap_or_default()
	}
}

/// A contract produced by a `contract_deploy` step of a scenario run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractHandle {
	pub name: String,
	pub address: String,
	/// Index of the step that deployed it.
	pub deployed_at: usize,
}

impl ContractHandle {
	pub fn from_deploy_result(name: &str, step: usize, result: &Value) -> Option<Self> {
		let address = match result {
			Value::String(s) => s.clone(),
			other => other.get("address")?.as_str()?.to_owned(),
		};
		Some(Self {
			name: name.to_owned(),
			address,
			deployed_at: step,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn method_names_round_trip() {
		for m in Method::ALL {
			assert_eq!(m.as_str().parse::<Method>().unwrap(), m);
			assert!(crate::codec::validate_method(m.as_str()).is_ok());
		}
		assert!("account_delete".parse::<Method>().is_err());
	}

	#[test]
	fn params_serialize_with_wire_field_names() {
		let params = to_params(&TxSendParams {
			from: "0xc86e8742966300101238f1a5eb834530bbc7689a".into(),
			to: String::new(),
			value: "0".into(),
			data: "6080".into(),
		});
		let keys: Vec<&str> = params.keys().map(String::as_str).collect();
		let mut required = Method::TxSend.required_params().to_vec();
		required.sort_unstable();
		assert_eq!(keys, required);
	}

	#[test]
	fn accounts_from_results() {
		let bob = json!({ "name": "bob", "address": "0xc86e", "balance": 0 });
		assert_eq!(
			Account::from_result(&bob),
			Some(Account { name: "bob".into(), address: "0xc86e".into() })
		);

		let list = json!([bob, { "name": "broken" }, { "name": "jack", "address": "0x9374" }]);
		let names: Vec<String> = Account::list_from_result(&list)
			.into_iter()
			.map(|a| a.name)
			.collect();
		assert_eq!(names, ["bob", "jack"]);
		assert!(Account::list_from_result(&json!({})).is_empty());
	}

	#[test]
	fn contract_handle_accepts_object_or_bare_address() {
		let h = ContractHandle::from_deploy_result("token", 2, &json!({ "address": "0xdead" })).unwrap();
		assert_eq!(h.address, "0xdead");
		assert_eq!(h.deployed_at, 2);
		assert!(ContractHandle::from_deploy_result("t", 0, &json!("0xbeef")).is_some());
		assert!(ContractHandle::from_deploy_result("t", 0, &json!(null)).is_none());
	}
}
