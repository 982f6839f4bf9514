//! Request/response correlation shared by every connection.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use taglight_msgpack::Value;

use crate::{Error, RemoteError, Result};

/// Identifies one connection within a [`CorrelationTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u32);

impl std::fmt::Display for ConnectionId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "conn#{}", self.0)
	}
}

/// One outstanding request.
///
/// The result cell is written exactly once, by whoever removes the call from the table.
struct PendingCall {
	conn: ConnectionId,
	id: u64,
	method: String,
	slot: Mutex<Option<Result<Value>>>,
	ready: Condvar,
}

impl PendingCall {
	fn deliver(&self, result: Result<Value>) {
		let mut slot = self.slot.lock();
		*slot = Some(result);
		self.ready.notify_one();
	}
}

/// FIFO of outstanding calls keyed by (connection, id).
///
/// The table lock only guards insertion and removal. Results are handed over through
/// each call's own slot, so waking one caller never touches another's.
#[derive(Default)]
pub struct CorrelationTable {
	calls: Mutex<VecDeque<Arc<PendingCall>>>,
	next_conn: AtomicU32,
}

impl CorrelationTable {
	/// Creates an empty table.
	pub fn new() -> Self {
		Self::default()
	}

	/// Allocates an identifier for a new connection.
	pub fn next_connection_id(&self) -> ConnectionId {
		ConnectionId(self.next_conn.fetch_add(1, Ordering::Relaxed))
	}

	/// Registers a call before its request is written.
	pub fn register(self: &Arc<Self>, conn: ConnectionId, id: u64, method: &str) -> PendingResponse {
		let call = Arc::new(PendingCall {
			conn,
			id,
			method: method.to_owned(),
			slot: Mutex::new(None),
			ready: Condvar::new(),
		});
		self.calls.lock().push_back(Arc::clone(&call));
		PendingResponse {
			call,
			table: Arc::clone(self),
		}
	}

	/// Delivers a response to the call waiting on (`conn`, `id`).
	///
	/// Returns false if no such call is outstanding. The response is then dropped.
	pub fn complete(&self, conn: ConnectionId, id: u64, result: std::result::Result<Value, Value>) -> bool {
		let Some(call) = self.take(conn, id) else {
			tracing::warn!(%conn, id, "response matches no pending call; dropping");
			return false;
		};
		tracing::trace!(%conn, id, method = %call.method, "rpc.response");
		call.deliver(result.map_err(|e| Error::Remote(RemoteError::from_value(&e))));
		true
	}

	/// Fails every call outstanding on `conn` with [`Error::ServiceStopped`].
	///
	/// Calls belonging to other connections are untouched.
	pub fn fail_connection(&self, conn: ConnectionId) -> usize {
		let failed: VecDeque<_> = {
			let mut calls = self.calls.lock();
			let (failed, kept) = calls.drain(..).partition(|c| c.conn == conn);
			*calls = kept;
			failed
		};
		for call in &failed {
			tracing::debug!(%conn, id = call.id, method = %call.method, "failing pending call");
			call.deliver(Err(Error::ServiceStopped));
		}
		failed.len()
	}

	/// Number of outstanding calls across all connections.
	pub fn len(&self) -> usize {
		self.calls.lock().len()
	}

	/// Returns true if no call is outstanding.
	pub fn is_empty(&self) -> bool {
		self.calls.lock().is_empty()
	}

	fn take(&self, conn: ConnectionId, id: u64) -> Option<Arc<PendingCall>> {
		let mut calls = self.calls.lock();
		let pos = calls.iter().position(|c| c.conn == conn && c.id == id)?;
		calls.remove(pos)
	}
}

/// The caller's side of a pending call.
///
/// Dropping it without waiting abandons the call: a later response is logged as a
/// correlation miss.
#[must_use = "a pending response does nothing unless waited on"]
pub struct PendingResponse {
	call: Arc<PendingCall>,
	table: Arc<CorrelationTable>,
}

impl PendingResponse {
	/// The request id this handle waits for.
	pub fn id(&self) -> u64 {
		self.call.id
	}

	/// Blocks until the matching response arrives or the connection is torn down.
	pub fn wait(self) -> Result<Value> {
		let mut slot = self.call.slot.lock();
		loop {
			if let Some(result) = slot.take() {
				return result;
			}
			self.call.ready.wait(&mut slot);
		}
	}

	/// Like [`wait`](Self::wait), giving up after `timeout`.
	///
	/// On expiry the call is removed from the table so a late response is treated as
	/// a correlation miss.
	pub fn wait_timeout(self, timeout: Duration) -> Result<Value> {
		let deadline = Instant::now() + timeout;
		{
			let mut slot = self.call.slot.lock();
			loop {
				if let Some(result) = slot.take() {
					return result;
				}
				if self.call.ready.wait_until(&mut slot, deadline).timed_out() {
					break;
				}
			}
		}

		if self.table.take(self.call.conn, self.call.id).is_some() {
			tracing::warn!(conn = %self.call.conn, id = self.call.id, method = %self.call.method, "rpc call timed out");
			return Err(Error::Timeout {
				method: self.call.method.clone(),
			});
		}
		// Lost the race with a delivery that removed the call first.
		self.wait()
	}
}

impl Drop for PendingResponse {
	fn drop(&mut self) {
		if self.call.slot.lock().is_none() {
			// Still registered unless a delivery is in flight.
			let _ = self.table.take(self.call.conn, self.call.id);
		}
	}
}
