//! Byte transport to the simulator service.
//!
//! A transport moves one request frame out and one response frame back. It
//! knows where a frame ends but nothing about JSON; interpreting the bytes
//! is the codec's job.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, trace};

use crate::codec::FRAME_DELIMITER;

/// Bytes requested from the socket per read.
const READ_CHUNK: usize = 8 * 1024;

/// Default ceiling on a single response.
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 64 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum TransportError {
	#[error("failed to connect to {endpoint}: {source}")]
	Connect {
		endpoint: String,
		#[source]
		source: std::io::Error,
	},

	#[error("no complete response within {0:?}")]
	Timeout(Duration),

	#[error("connection closed after {received} bytes, before the end of the response")]
	TruncatedResponse { received: usize },

	#[error("response exceeds the {limit}-byte limit")]
	ResponseTooLarge { limit: usize },

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// How the reader recognises the end of a response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Framing {
	/// The response ends at the first newline.
	#[default]
	Newline,
	/// The response ends when the service closes the connection.
	ConnectionClose,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
	pub host: String,
	pub port: u16,
}

impl Endpoint {
	pub fn new(host: impl Into<String>, port: u16) -> Self {
		Self {
			host: host.into(),
			port,
		}
	}
}

impl fmt::Display for Endpoint {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.host, self.port)
	}
}

/// Sends one request frame and waits for the matching response frame.
///
/// Object safe so clients can hold an `Arc<dyn Transport>`.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
	/// Returns the response frame without its delimiter. Must not
	/// interpret the payload.
	async fn call(&self, request: &[u8], timeout: Duration) -> Result<Vec<u8>>;
}

/// One fresh TCP connection per call.
#[derive(Debug, Clone)]
pub struct TcpTransport {
	endpoint: Endpoint,
	framing: Framing,
	max_response_bytes: usize,
}

impl TcpTransport {
	pub fn new(endpoint: Endpoint) -> Self {
		Self {
			endpoint,
			framing: Framing::default(),
			max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
		}
	}

	pub fn with_framing(mut self, framing: Framing) -> Self {
		self.framing = framing;
		self
	}

	pub fn with_max_response_bytes(mut self, limit: usize) -> Self {
		self.max_response_bytes = limit;
		self
	}

	pub fn endpoint(&self) -> &Endpoint {
		&self.endpoint
	}

	async fn exchange(&self, request: &[u8]) -> Result<Vec<u8>> {
		let mut stream = TcpStream::connect((self.endpoint.host.as_str(), self.endpoint.port))
			.await
			.map_err(|source| TransportError::Connect {
				endpoint: self.endpoint.to_string(),
				source,
			})?;
		trace!(endpoint = %self.endpoint, "connected");

		stream.write_all(request).await?;
		stream.flush().await?;

		read_frame(&mut stream, self.framing, self.max_response_bytes).await
	}
}

#[async_trait::async_trait]
impl Transport for TcpTransport {
	async fn call(&self, request: &[u8], timeout: Duration) -> Result<Vec<u8>> {
		// The stream lives inside `exchange`; dropping that future on
		// timeout or cancellation closes the socket.
		let response = tokio::time::timeout(timeout, self.exchange(request))
			.await
			.map_err(|_| TransportError::Timeout(timeout))??;
		debug!(
			endpoint = %self.endpoint,
			sent = request.len(),
			received = response.len(),
			"exchange complete"
		);
		Ok(response)
	}
}

/// Read one frame, looping over partial reads until the framing boundary.
pub async fn read_frame<R>(reader: &mut R, framing: Framing, limit: usize) -> Result<Vec<u8>>
where
	R: AsyncRead + Unpin,
{
	let mut buf = Vec::new();
	let mut chunk = vec![0u8; READ_CHUNK];

	loop {
		let n = reader.read(&mut chunk).await?;
		if n == 0 {
			return match framing {
				Framing::ConnectionClose if !buf.is_empty() => Ok(buf),
				_ => Err(TransportError::TruncatedResponse {
					received: buf.len(),
				}),
			};
		}

		let scanned = buf.len();
		buf.extend_from_slice(&chunk[..n]);

		if framing == Framing::Newline {
			if let Some(pos) = buf[scanned..].iter().position(|b| *b == FRAME_DELIMITER) {
				buf.truncate(scanned + pos);
				if buf.len() > limit {
					return Err(TransportError::ResponseTooLarge { limit });
				}
				return Ok(buf);
			}
		}

		if buf.len() > limit {
			return Err(TransportError::ResponseTooLarge { limit });
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tokio::io::duplex;
	use tokio::net::TcpListener;

	#[tokio::test]
	async fn reassembles_multi_megabyte_frame_from_partial_reads() {
		// Small duplex buffer forces many short reads.
		let (mut client, mut server) = duplex(1024);
		let mut payload = vec![b'x'; 3 * 1024 * 1024 + 17];
		payload.push(FRAME_DELIMITER);
		let expected_len = payload.len() - 1;

		let writer = tokio::spawn(async move {
			server.write_all(&payload).await.unwrap();
		});

		let frame = read_frame(&mut client, Framing::Newline, DEFAULT_MAX_RESPONSE_BYTES)
			.await
			.unwrap();
		writer.await.unwrap();

		assert_eq!(frame.len(), expected_len);
		assert!(frame.iter().all(|b| *b == b'x'));
	}

	#[tokio::test]
	async fn large_json_result_decodes_after_partial_reads() {
		use crate::codec::{decode_response, encode_response, RpcOutcome};

		let accounts: Vec<_> = (0..50_000)
			.map(|i| serde_json::json!({ "name": format!("user-{i}"), "address": format!("0x{i:040x}") }))
			.collect();
		let outcome = RpcOutcome::Success {
			result: serde_json::Value::Array(accounts),
		};
		let bytes = encode_response(&outcome).unwrap();
		assert!(bytes.len() > 4 * 1024 * 1024);

		let (mut client, mut server) = duplex(1024);
		let writer = tokio::spawn(async move {
			server.write_all(&bytes).await.unwrap();
		});

		let frame = read_frame(&mut client, Framing::Newline, DEFAULT_MAX_RESPONSE_BYTES)
			.await
			.unwrap();
		writer.await.unwrap();

		assert_eq!(decode_response(&frame).unwrap(), outcome);
	}

	#[tokio::test]
	async fn eof_before_newline_is_truncation() {
		let (mut client, mut server) = duplex(64);
		tokio::spawn(async move {
			server.write_all(br#"{"result":[1,2"#).await.unwrap();
			// server dropped: connection closes mid-message
		});

		let err = read_frame(&mut client, Framing::Newline, 1024).await.unwrap_err();
		assert!(matches!(err, TransportError::TruncatedResponse { received: 14 }));
	}

	#[tokio::test]
	async fn connection_close_framing_reads_to_eof() {
		let (mut client, mut server) = duplex(16);
		tokio::spawn(async move {
			server.write_all(b"{\"result\":\n1}").await.unwrap();
		});

		let frame = read_frame(&mut client, Framing::ConnectionClose, 1024).await.unwrap();
		assert_eq!(frame, b"{\"result\":\n1}");

		let (mut client, server) = duplex(16);
		drop(server);
		let err = read_frame(&mut client, Framing::ConnectionClose, 1024).await.unwrap_err();
		assert!(matches!(err, TransportError::TruncatedResponse { received: 0 }));
	}

	#[tokio::test]
	async fn oversized_response_is_rejected() {
		let (mut client, mut server) = duplex(256);
		tokio::spawn(async move {
			let _ = server.write_all(&vec![b'y'; 10_000]).await;
		});

		let err = read_frame(&mut client, Framing::Newline, 4096).await.unwrap_err();
		assert!(matches!(err, TransportError::ResponseTooLarge { limit: 4096 }));
	}

	#[tokio::test]
	async fn tcp_round_trip_and_one_connection_per_call() {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let port = listener.local_addr().unwrap().port();

		let server = tokio::spawn(async move {
			for _ in 0..2 {
				let (mut sock, _) = listener.accept().await.unwrap();
				let request = read_frame(&mut sock, Framing::Newline, 1024).await.unwrap();
				sock.write_all(&request).await.unwrap();
				sock.write_all(b"\n").await.unwrap();
			}
		});

		let transport = TcpTransport::new(Endpoint::new("127.0.0.1", port));
		let bodies: [&[u8]; 2] = [b"ping-1\n", b"ping-2\n"];
		for body in bodies {
			let reply = transport.call(body, Duration::from_secs(5)).await.unwrap();
			assert_eq!(reply, &body[..body.len() - 1]);
		}
		server.await.unwrap();
	}

	#[tokio::test]
	async fn refused_connection_is_connect_error() {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let port = listener.local_addr().unwrap().port();
		drop(listener);

		let transport = TcpTransport::new(Endpoint::new("127.0.0.1", port));
		let err = transport.call(b"{}\n", Duration::from_secs(5)).await.unwrap_err();
		assert!(matches!(err, TransportError::Connect { .. }), "{err}");
	}

	#[tokio::test]
	async fn silent_service_times_out() {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let port = listener.local_addr().unwrap().port();
		let _server = tokio::spawn(async move {
			let (_sock, _) = listener.accept().await.unwrap();
			std::future::pending::<()>().await;
		});

		let transport = TcpTransport::new(Endpoint::new("127.0.0.1", port));
		let err = transport
			.call(b"{}\n", Duration::from_millis(100))
			.await
			.unwrap_err();
		assert!(matches!(err, TransportError::Timeout(_)));
	}
}
