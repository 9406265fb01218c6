//! Test doubles for the transport and the service.
//!
//! [`ScriptedTransport`] answers calls from a fixed script without touching
//! the network. [`StubService`] is a real TCP listener that answers with a
//! handler closure, for exercising the full client stack.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::codec::{self, RpcOutcome, RpcRequest};
use crate::transport::{self, read_frame, Endpoint, Framing, Transport, TransportError};

/// One canned answer of a [`ScriptedTransport`].
#[derive(Debug, Clone)]
pub enum ScriptedReply {
	Outcome(RpcOutcome),
	/// Raw response bytes, delivered as-is.
	Raw(Vec<u8>),
	Refused,
	Timeout,
	Truncated,
	/// Never answers; the call only ends when its future is dropped.
	Hang,
}

impl ScriptedReply {
	pub fn success(result: Value) -> Self {
		Self::Outcome(RpcOutcome::Success { result })
	}
}

/// Answers calls in order from a script and records every request.
///
/// Once the script is exhausted, further calls are refused.
pub struct ScriptedTransport {
	replies: Mutex<VecDeque<ScriptedReply>>,
	requests: Mutex<Vec<Vec<u8>>>,
}

impl ScriptedTransport {
	pub fn new(replies: impl IntoIterator<Item = ScriptedReply>) -> Self {
		Self {
			replies: Mutex::new(replies.into_iter().collect()),
			requests: Mutex::new(Vec::new()),
		}
	}

	/// Number of calls made so far, i.e. connections a real transport
	/// would have opened.
	pub async fn calls(&self) -> usize {
		self.requests.lock().await.len()
	}

	/// Every request received, decoded.
	pub async fn requests(&self) -> Vec<RpcRequest> {
		self.requests
			.lock()
			.await
			.iter()
			.filter_map(|bytes| codec::decode_request(bytes).ok())
			.collect()
	}

	/// Every request received, as sent on the wire.
	pub async fn raw_requests(&self) -> Vec<Vec<u8>> {
		self.requests.lock().await.clone()
	}
}

#[async_trait::async_trait]
impl Transport for ScriptedTransport {
	async fn call(&self, request: &[u8], timeout: Duration) -> transport::Result<Vec<u8>> {
		self.requests.lock().await.push(request.to_vec());
		let reply = self.replies.lock().await.pop_front();

		match reply {
			Some(ScriptedReply::Outcome(outcome)) => codec::encode_response(&outcome)
				.map_err(|e| TransportError::Io(std::io::Error::other(e))),
			Some(ScriptedReply::Raw(bytes)) => Ok(bytes),
			Some(ScriptedReply::Timeout) => Err(TransportError::Timeout(timeout)),
			Some(ScriptedReply::Truncated) => Err(TransportError::TruncatedResponse { received: 0 }),
			Some(ScriptedReply::Hang) => std::future::pending().await,
			Some(ScriptedReply::Refused) | None => Err(TransportError::Connect {
				endpoint: "scripted".into(),
				source: std::io::ErrorKind::ConnectionRefused.into(),
			}),
		}
	}
}

type Handler = dyn Fn(RpcRequest) -> RpcOutcome + Send + Sync;

/// A newline-framed TCP service on an ephemeral localhost port.
///
/// The accept loop is aborted when the stub is dropped.
pub struct StubService {
	addr: SocketAddr,
	connections: Arc<AtomicUsize>,
	task: JoinHandle<()>,
}

impl StubService {
	pub async fn spawn<F>(handler: F) -> std::io::Result<Self>
	where
		F: Fn(RpcRequest) -> RpcOutcome + Send + Sync + 'static,
	{
		let listener = TcpListener::bind("127.0.0.1:0").await?;
		let addr = listener.local_addr()?;
		let connections = Arc::new(AtomicUsize::new(0));
		let handler: Arc<Handler> = Arc::new(handler);

		let counter = connections.clone();
		let task = tokio::spawn(async move {
			while let Ok((mut sock, peer)) = listener.accept().await {
				counter.fetch_add(1, Ordering::SeqCst);
				let handler = handler.clone();
				tokio::spawn(async move {
					let frame =
						match read_frame(&mut sock, Framing::Newline, transport::DEFAULT_MAX_RESPONSE_BYTES)
							.await
						{
							Ok(frame) => frame,
							Err(e) => {
								debug!(%peer, error = %e, "stub dropped connection");
								return;
							}
						};
					let outcome = match codec::decode_request(&frame) {
						Ok(request) => handler(request),
						Err(e) => RpcOutcome::application(e.to_string()),
					};
					if let Ok(bytes) = codec::encode_response(&outcome) {
						let _ = sock.write_all(&bytes).await;
					}
				});
			}
		});

		Ok(Self {
			addr,
			connections,
			task,
		})
	}

	pub fn endpoint(&self) -> Endpoint {
		Endpoint::new(self.addr.ip().to_string(), self.addr.port())
	}

	/// Connections accepted so far.
	pub fn connections(&self) -> usize {
		self.connections.load(Ordering::SeqCst)
	}
}

impl Drop for StubService {
	fn drop(&mut self) {
		self.task.abort();
	}
}
