use std::io::{self, BufRead, BufReader, Write};
use std::marker::PhantomData;
use std::os::unix::net::UnixStream;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use crate::paths::DaemonPaths;

/// Errors from daemon client operations.
#[derive(Debug, Error)]
pub enum ClientError {
	/// Daemon is not running (socket not found).
	#[error("daemon not running")]
	NotRunning,
	/// IO error during communication.
	#[error("io error: {0}")]
	Io(#[from] io::Error),
	/// Failed to serialize request.
	#[error("serialize error: {0}")]
	Serialize(String),
	/// Failed to deserialize response.
	#[error("deserialize error: {0}")]
	Deserialize(String),
	/// The daemon closed the connection without answering.
	#[error("daemon closed the connection")]
	Closed,
}

/// Synchronous client for the supervisor's control socket.
///
/// Generic over the request and response types, which only need `Serialize`
/// and `DeserializeOwned`.
pub struct DaemonClient<Req, Resp> {
	stream: UnixStream,
	_phantom: PhantomData<(Req, Resp)>,
}

impl<Req, Resp> DaemonClient<Req, Resp>
where
	Req: Serialize,
	Resp: DeserializeOwned,
{
	/// Connect to an already-running daemon.
	/// Returns `Err(ClientError::NotRunning)` if the socket doesn't exist.
	pub fn connect(paths: &DaemonPaths) -> Result<Self, ClientError> {
		let socket_path = paths.socket_path();
		let stream = UnixStream::connect(&socket_path).map_err(|_| ClientError::NotRunning)?;
		Ok(Self {
			stream,
			_phantom: PhantomData,
		})
	}

	pub fn with_timeout(self, timeout: Duration) -> Result<Self, ClientError> {
		self.stream.set_read_timeout(Some(timeout))?;
		Ok(self)
	}

	/// Send a request and receive a response.
	pub fn send(&mut self, request: &Req) -> Result<Resp, ClientError> {
		let mut data =
			serde_json::to_vec(request).map_err(|e| ClientError::Serialize(e.to_string()))?;
		data.push(b'\n');
		self.stream.write_all(&data)?;

		let mut reader = BufReader::new(&self.stream);
		let mut line = String::new();
		if reader.read_line(&mut line)? == 0 {
			return Err(ClientError::Closed);
		}

		serde_json::from_str(&line).map_err(|e| ClientError::Deserialize(e.to_string()))
	}
}

/// Check if a daemon is running (socket is connectable).
pub fn is_running(paths: &DaemonPaths) -> bool {
	let socket_path = paths.socket_path();
	UnixStream::connect(&socket_path).is_ok()
}

/// Read the PID of a running daemon from its PID file.
pub fn read_pid(paths: &DaemonPaths) -> Option<u32> {
	let pid_path = paths.pid_path();
	std::fs::read_to_string(pid_path)
		.ok()
		.and_then(|s| s.trim().parse().ok())
}
