//! A single MessagePack-RPC connection and its reader loop.

use std::io::{BufReader, Read, Write};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use taglight_msgpack::{Value, decode_from, encode};

use crate::protocol::{CounterIdGen, Message};
use crate::table::{ConnectionId, CorrelationTable, PendingResponse};
use crate::Result;

/// Receives notifications decoded by a connection's reader loop.
///
/// Called on the reader thread. Implementations must hand long-running work to
/// another thread so the connection keeps reading.
pub trait NotificationHandler: Send + Sync {
	/// Handles one notification.
	fn handle_notification(&self, method: &str, params: Vec<Value>);
}

impl<F> NotificationHandler for F
where
	F: Fn(&str, Vec<Value>) + Send + Sync,
{
	fn handle_notification(&self, method: &str, params: Vec<Value>) {
		self(method, params)
	}
}

/// The writing half of a connection plus its request bookkeeping.
///
/// Any number of threads may call through one connection concurrently. Each call
/// blocks only on its own response.
pub struct Connection {
	id: ConnectionId,
	ids: CounterIdGen,
	writer: Mutex<Box<dyn Write + Send>>,
	table: Arc<CorrelationTable>,
	timeout: Option<Duration>,
}

impl std::fmt::Debug for Connection {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Connection")
			.field("id", &self.id)
			.field("timeout", &self.timeout)
			.finish_non_exhaustive()
	}
}

impl Connection {
	/// Creates a connection writing to `writer`, registering calls in `table`.
	pub fn new(table: Arc<CorrelationTable>, writer: impl Write + Send + 'static) -> Self {
		Self {
			id: table.next_connection_id(),
			ids: CounterIdGen::new(),
			writer: Mutex::new(Box::new(writer)),
			table,
			timeout: None,
		}
	}

	/// Makes [`call`](Self::call) give up after `timeout`. `None` waits forever.
	#[must_use]
	pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
		self.timeout = timeout;
		self
	}

	/// This connection's identifier.
	pub fn id(&self) -> ConnectionId {
		self.id
	}

	/// The shared correlation table.
	pub fn table(&self) -> &Arc<CorrelationTable> {
		&self.table
	}

	/// Sends a request and blocks until its response arrives.
	pub fn call(&self, method: &str, params: Vec<Value>) -> Result<Value> {
		let pending = self.send_request(method, params)?;
		match self.timeout {
			Some(timeout) => pending.wait_timeout(timeout),
			None => pending.wait(),
		}
	}

	/// Sends a request without waiting, returning the handle to wait on.
	///
	/// The call is registered before the request is written so a fast response can
	/// never arrive ahead of its bookkeeping.
	pub fn send_request(&self, method: &str, params: Vec<Value>) -> Result<PendingResponse> {
		let id = self.ids.next();
		let pending = self.table.register(self.id, id, method);
		tracing::trace!(conn = %self.id, id, method, "rpc.request");
		// On failure the handle is dropped, which unregisters the call.
		self.write(Message::Request {
			id,
			method: method.to_owned(),
			params,
		})?;
		Ok(pending)
	}

	/// Sends a notification. Nothing is expected back.
	pub fn notify(&self, method: &str, params: Vec<Value>) -> Result<()> {
		self.write(Message::Notification {
			method: method.to_owned(),
			params,
		})
	}

	/// Answers a request received from the peer.
	pub fn respond(&self, id: u64, result: std::result::Result<Value, Value>) -> Result<()> {
		self.write(Message::Response { id, result })
	}

	fn write(&self, msg: Message) -> Result<()> {
		let mut buf = Vec::with_capacity(128);
		encode(&msg.into_value(), &mut buf);
		let mut writer = self.writer.lock();
		writer.write_all(&buf)?;
		writer.flush()?;
		Ok(())
	}

	/// Reads and routes envelopes until the peer hangs up or desynchronizes.
	///
	/// Responses complete their pending calls, notifications go to `handler`, and
	/// requests from the peer are answered with an error. When the loop ends, for
	/// whatever reason, every call still pending on this connection fails with
	/// [`Error::ServiceStopped`](crate::Error::ServiceStopped). A clean end of stream returns `Ok`.
	pub fn run_reader(&self, reader: impl Read, handler: &dyn NotificationHandler) -> Result<()> {
		let result = self.read_loop(BufReader::new(reader), handler);
		let failed = self.table.fail_connection(self.id);
		match &result {
			Ok(()) => tracing::info!(conn = %self.id, failed, "peer closed connection"),
			Err(e) => tracing::error!(conn = %self.id, error = %e, failed, "connection torn down"),
		}
		result
	}

	fn read_loop(&self, mut reader: impl Read, handler: &dyn NotificationHandler) -> Result<()> {
		loop {
			let value = match decode_from(&mut reader) {
				Ok(value) => value,
				Err(taglight_msgpack::Error::Eof) => return Ok(()),
				Err(e) => return Err(e.into()),
			};

			match Message::from_value(value)? {
				Message::Response { id, result } => {
					self.table.complete(self.id, id, result);
				}
				Message::Notification { method, params } => {
					tracing::trace!(conn = %self.id, method = %method, "rpc.notification");
					handler.handle_notification(&method, params);
				}
				Message::Request { id, method, .. } => {
					tracing::warn!(conn = %self.id, id, method = %method, "peer request not supported");
					let error = Value::Array(vec![Value::Int(0), Value::from(format!("method not found: {method}"))]);
					self.respond(id, Err(error))?;
				}
			}
		}
	}
}
