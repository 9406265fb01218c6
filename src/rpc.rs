use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::codec::{self, CodecError, RpcOutcome, RpcRequest};
use crate::config::ServiceConfig;
use crate::methods::{
	to_params, AccountAddParams, ContractCallParams, ContractDeployParams, Method, TxSendParams,
};
use crate::transport::{TcpTransport, Transport};

/// Synchronous-per-call JSON-RPC client for the simulator service.
///
/// Every call opens its own connection through the transport. Transport and
/// codec failures are folded into [`RpcOutcome::Failure`] with
/// [`FailureCode::Network`](crate::codec::FailureCode::Network); nothing is
/// retried here.
#[derive(Clone)]
pub struct RpcClient {
	transport: Arc<dyn Transport>,
	timeout: Duration,
}

impl RpcClient {
	pub fn new(transport: Arc<dyn Transport>, timeout: Duration) -> Self {
		Self { transport, timeout }
	}

	/// Build a TCP client from the `[service]` section of the config.
	pub fn from_config(service: &ServiceConfig) -> Self {
		let transport = TcpTransport::new(service.endpoint())
			.with_framing(service.framing)
			.with_max_response_bytes(service.max_response_bytes);
		Self::new(Arc::new(transport), service.timeout())
	}

	pub fn timeout(&self) -> Duration {
		self.timeout
	}

	/// Call `method` with the client's default timeout.
	///
	/// The only error is a malformed method name, caught before any I/O.
	pub async fn invoke(
		&self,
		method: &str,
		params: Map<String, Value>,
	) -> Result<RpcOutcome, CodecError> {
		let request = RpcRequest::new(method, params)?;
		Ok(self.call(&request, self.timeout).await)
	}

	/// Send a prepared request.
	pub async fn call(&self, request: &RpcRequest, timeout: Duration) -> RpcOutcome {
		let bytes = match codec::encode_request(request) {
			Ok(bytes) => bytes,
			Err(e) => return RpcOutcome::network(e.to_string()),
		};
		debug!(method = %request.method, bytes = bytes.len(), "sending request");

		let response = match self.transport.call(&bytes, timeout).await {
			Ok(response) => response,
			Err(e) => {
				warn!(method = %request.method, error = %e, "transport failure");
				return RpcOutcome::network(e.to_string());
			}
		};

		match codec::decode_response(&response) {
			Ok(outcome) => outcome,
			Err(e) => {
				warn!(method = %request.method, error = %e, "undecodable response");
				RpcOutcome::network(e.to_string())
			}
		}
	}

	// -- Typed helpers --

	async fn typed(&self, method: Method, params: Map<String, Value>) -> RpcOutcome {
		let request = RpcRequest {
			method: method.as_str().to_owned(),
			params,
		};
		self.call(&request, self.timeout).await
	}

	pub async fn account_add(&self, name: &str) -> RpcOutcome {
		let params = to_params(&AccountAddParams { name: name.to_owned() });
		self.typed(Method::AccountAdd, params).await
	}

	pub async fn account_list(&self) -> RpcOutcome {
		self.typed(Method::AccountList, Map::new()).await
	}

	pub async fn contract_deploy(&self, from: &str, contract_file: &str) -> RpcOutcome {
		let params = to_params(&ContractDeployParams {
			from: from.to_owned(),
			contract_file: contract_file.to_owned(),
		});
		self.typed(Method::ContractDeploy, params).await
	}

	pub async fn contract_call(&self, from: &str, contract: &str, input: &str) -> RpcOutcome {
		let params = to_params(&ContractCallParams {
			from: from.to_owned(),
			contract: contract.to_owned(),
			input: input.to_owned(),
		});
		self.typed(Method::ContractCall, params).await
	}

	pub async fn tx_send(&self, tx: &TxSendParams) -> RpcOutcome {
		self.typed(Method::TxSend, to_params(tx)).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::codec::FailureCode;
	use crate::mock::{ScriptedReply, ScriptedTransport};
	use serde_json::json;

	fn client(transport: &Arc<ScriptedTransport>) -> RpcClient {
		RpcClient::new(transport.clone(), Duration::from_secs(1))
	}

	#[tokio::test]
	async fn invoke_returns_decoded_success() {
		let transport = Arc::new(ScriptedTransport::new([ScriptedReply::success(
			json!({ "name": "bob", "address": "0xc86e8742966300101238f1a5eb834530bbc7689a" }),
		)]));
		let out = client(&transport).account_add("bob").await;

		assert_eq!(
			out.result().and_then(|r| r.get("address")),
			Some(&json!("0xc86e8742966300101238f1a5eb834530bbc7689a"))
		);
		let sent = transport.requests().await;
		assert_eq!(sent.len(), 1);
		assert_eq!(sent[0].method, "account_add");
		assert_eq!(sent[0].params.get("name"), Some(&json!("bob")));
	}

	#[tokio::test]
	async fn transport_errors_become_network_failures() {
		let transport = Arc::new(ScriptedTransport::new([
			ScriptedReply::Refused,
			ScriptedReply::Timeout,
			ScriptedReply::Truncated,
			ScriptedReply::Raw(b"{\"result\":".to_vec()),
			ScriptedReply::Raw(b"{}".to_vec()),
		]));
		let client = client(&transport);

		for _ in 0..5 {
			let out = client.account_list().await;
			assert_eq!(out.failure_code(), Some(FailureCode::Network), "{out:?}");
		}
		assert_eq!(transport.calls().await, 5);
	}

	#[tokio::test]
	async fn application_errors_pass_through() {
		let transport = Arc::new(ScriptedTransport::new([ScriptedReply::Outcome(
			RpcOutcome::application("balance is not enough"),
		)]));
		let out = client(&transport)
			.tx_send(&TxSendParams {
				from: "0x01".into(),
				to: "0x02".into(),
				value: "1000000".into(),
				data: String::new(),
			})
			.await;
		assert_eq!(out, RpcOutcome::application("balance is not enough"));
	}

	#[tokio::test]
	async fn bad_method_name_fails_before_io() {
		let transport = Arc::new(ScriptedTransport::new([]));
		let err = client(&transport).invoke("Account Add", Map::new()).await.unwrap_err();
		assert!(matches!(err, CodecError::InvalidMethod(_)));
		assert_eq!(transport.calls().await, 0);
	}
}
