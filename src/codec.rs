use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

/// Byte that terminates every request and response frame.
pub const FRAME_DELIMITER: u8 = b'\n';

#[derive(Debug, Error)]
pub enum CodecError {
	#[error("invalid method name {0:?}")]
	InvalidMethod(String),

	#[error("failed to encode message: {0}")]
	Encode(#[source] serde_json::Error),

	#[error("message is not well-formed JSON: {0}")]
	Decode(#[source] serde_json::Error),

	#[error("protocol violation: {0}")]
	Protocol(String),
}

/// One call on the wire: a method name plus a named-parameter object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
	pub method: String,
	#[serde(default)]
	pub params: Map<String, Value>,
}

impl RpcRequest {
	/// Build a request, rejecting method names the service could never
	/// dispatch.
	pub fn new(method: &str, params: Map<String, Value>) -> Result<Self, CodecError> {
		validate_method(method)?;
		Ok(Self {
			method: method.to_owned(),
			params,
		})
	}
}

/// Method names are lowercase snake case: `[a-z][a-z0-9_]*`.
pub fn validate_method(method: &str) -> Result<(), CodecError> {
	let mut chars = method.chars();
	let valid = matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
		&& chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
	if valid {
		Ok(())
	} else {
		Err(CodecError::InvalidMethod(method.to_owned()))
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCode {
	/// Transport or codec failure; the service may never have seen the call.
	Network,
	/// The service processed the call and reported an error.
	Application,
}

/// Result of a single RPC call. Exactly one variant holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RpcOutcome {
	Success { result: Value },
	Failure { code: FailureCode, message: String },
}

impl RpcOutcome {
	pub fn network(message: impl Into<String>) -> Self {
		Self::Failure {
			code: FailureCode::Network,
			message: message.into(),
		}
	}

	pub fn application(message: impl Into<String>) -> Self {
		Self::Failure {
			code: FailureCode::Application,
			message: message.into(),
		}
	}

	pub fn is_success(&self) -> bool {
		matches!(self, Self::Success { .. })
	}

	pub fn result(&self) -> Option<&Value> {
		match self {
			Self::Success { result } => Some(result),
			Self::Failure { .. } => None,
		}
	}

	pub fn failure_code(&self) -> Option<FailureCode> {
		match self {
			Self::Success { .. } => None,
			Self::Failure { code, .. } => Some(*code),
		}
	}
}

// -- Client side --

/// Serialize a request as one compact JSON line.
pub fn encode_request(request: &RpcRequest) -> Result<Vec<u8>, CodecError> {
	validate_method(&request.method)?;
	let mut bytes = serde_json::to_vec(request).map_err(CodecError::Encode)?;
	bytes.push(FRAME_DELIMITER);
	Ok(bytes)
}

/// Interpret one response frame.
///
/// A non-null `error` wins over `result`; a frame carrying both non-null
/// is rejected, as is one carrying neither.
pub fn decode_response(bytes: &[u8]) -> Result<RpcOutcome, CodecError> {
	let value: Value = serde_json::from_slice(bytes).map_err(CodecError::Decode)?;
	let Value::Object(mut frame) = value else {
		return Err(CodecError::Protocol("response is not a JSON object".into()));
	};

	let error = frame.remove("error").filter(|e| !e.is_null());
	let result = frame.remove("result");

	match (result, error) {
		(Some(result), None) => Ok(RpcOutcome::Success { result }),
		(Some(result), Some(_)) if !result.is_null() => Err(CodecError::Protocol(
			"response carries both a result and an error".into(),
		)),
		(_, Some(error)) => Ok(RpcOutcome::application(error_message(&error))),
		(None, None) => Err(CodecError::Protocol(
			"response carries neither a result nor an error".into(),
		)),
	}
}

fn error_message(error: &Value) -> String {
	match error {
		Value::String(s) => s.clone(),
		Value::Object(obj) => {
			let message = obj
				.get("message")
				.and_then(Value::as_str)
				.map(str::to_owned)
				.unwrap_or_else(|| error.to_string());
			let code = obj.get("kind").or_else(|| obj.get("code"));
			match code {
				Some(Value::String(c)) => format!("{c}: {message}"),
				Some(Value::Number(n)) => format!("{n}: {message}"),
				_ => message,
			}
		}
		other => other.to_string(),
	}
}

// -- Service side, used by stub services --

pub fn decode_request(bytes: &[u8]) -> Result<RpcRequest, CodecError> {
	let request: RpcRequest = serde_json::from_slice(bytes).map_err(CodecError::Decode)?;
	validate_method(&request.method)?;
	Ok(request)
}

pub fn encode_response(outcome: &RpcOutcome) -> Result<Vec<u8>, CodecError> {
	let frame = match outcome {
		RpcOutcome::Success { result } => json!({ "result": result }),
		RpcOutcome::Failure { message, .. } => json!({ "error": { "message": message } }),
	};
	let mut bytes = serde_json::to_vec(&frame).map_err(CodecError::Encode)?;
	bytes.push(FRAME_DELIMITER);
	Ok(bytes)
}
