//! Typed wrappers for the host editor's API.

use std::sync::Arc;

use taglight_msgpack::Value;

use crate::{Connection, Error, RemoteError, Result};

/// Thread class logged for detached calls.
const DETACHED_CLASS: &str = "rpc.detached";

/// Typed access to the host editor through one connection.
///
/// Buffer arguments are plain buffer numbers, which the host accepts in place of
/// buffer handles.
#[derive(Debug, Clone)]
pub struct Nvim {
	conn: Arc<Connection>,
}

impl Nvim {
	/// Wraps a connection.
	pub fn new(conn: Arc<Connection>) -> Self {
		Self { conn }
	}

	/// The underlying connection.
	pub fn connection(&self) -> &Arc<Connection> {
		&self.conn
	}

	/// Untyped blocking call.
	pub fn call(&self, method: &str, params: Vec<Value>) -> Result<Value> {
		self.conn.call(method, params)
	}

	/// Issues a call on a short-lived thread and discards its result.
	///
	/// Failures are only logged.
	pub fn call_detached(&self, method: &str, params: Vec<Value>) {
		let conn = Arc::clone(&self.conn);
		let method = method.to_owned();
		tracing::trace!(worker_class = DETACHED_CLASS, method = %method, "worker.spawn_named_thread");
		let spawned = std::thread::Builder::new().name("taglight-rpc-detached".into()).spawn(move || {
			if let Err(e) = conn.call(&method, params) {
				tracing::warn!(method = %method, error = %e, "detached call failed");
			}
		});
		if let Err(e) = spawned {
			tracing::warn!(error = %e, "failed to spawn detached call thread");
		}
	}

	/// `nvim_get_current_buf`
	pub fn get_current_buf(&self) -> Result<i64> {
		let method = "nvim_get_current_buf";
		let v = self.call(method, Vec::new())?;
		v.as_handle().ok_or_else(|| unexpected(method, "buffer handle", &v))
	}

	/// `nvim_buf_get_name`
	pub fn buf_get_name(&self, buf: i64) -> Result<String> {
		let method = "nvim_buf_get_name";
		let v = self.call(method, vec![Value::Int(buf)])?;
		string_result(method, &v)
	}

	/// `nvim_buf_get_option`
	pub fn buf_get_option(&self, buf: i64, name: &str) -> Result<Value> {
		self.call("nvim_buf_get_option", vec![Value::Int(buf), Value::from(name)])
	}

	/// Reads the `filetype` option as a string.
	pub fn buf_get_filetype(&self, buf: i64) -> Result<String> {
		let v = self.buf_get_option(buf, "filetype")?;
		string_result("nvim_buf_get_option", &v)
	}

	/// `nvim_buf_get_changedtick`
	pub fn buf_get_changedtick(&self, buf: i64) -> Result<u64> {
		let method = "nvim_buf_get_changedtick";
		let v = self.call(method, vec![Value::Int(buf)])?;
		v.as_u64().ok_or_else(|| unexpected(method, "unsigned integer", &v))
	}

	/// `nvim_buf_get_lines` over `[start, end)`; negative indices count from the end.
	pub fn buf_get_lines(&self, buf: i64, start: i64, end: i64, strict: bool) -> Result<Vec<Vec<u8>>> {
		let method = "nvim_buf_get_lines";
		let v = self.call(
			method,
			vec![Value::Int(buf), Value::Int(start), Value::Int(end), Value::Bool(strict)],
		)?;
		let found = v.type_name();
		let lines = v.into_array().ok_or_else(|| Error::UnexpectedType {
			method: method.into(),
			expected: "array",
			found,
		})?;
		lines
			.into_iter()
			.map(|line| match line {
				Value::String(bytes) => Ok(bytes),
				other => Err(unexpected(method, "string", &other)),
			})
			.collect()
	}

	/// `nvim_buf_line_count`
	pub fn buf_line_count(&self, buf: i64) -> Result<u64> {
		let method = "nvim_buf_line_count";
		let v = self.call(method, vec![Value::Int(buf)])?;
		v.as_u64().ok_or_else(|| unexpected(method, "unsigned integer", &v))
	}

	/// `nvim_buf_attach` with no options. Returns false if the host refused.
	pub fn buf_attach(&self, buf: i64, send_buffer: bool) -> Result<bool> {
		let method = "nvim_buf_attach";
		let v = self.call(method, vec![Value::Int(buf), Value::Bool(send_buffer), Value::Map(Vec::new())])?;
		v.as_bool().ok_or_else(|| unexpected(method, "boolean", &v))
	}

	/// `nvim_buf_detach`
	pub fn buf_detach(&self, buf: i64) -> Result<bool> {
		let method = "nvim_buf_detach";
		let v = self.call(method, vec![Value::Int(buf)])?;
		v.as_bool().ok_or_else(|| unexpected(method, "boolean", &v))
	}

	/// `nvim_buf_clear_namespace` over lines `[start, end)`; `end == -1` means to the end.
	pub fn buf_clear_namespace(&self, buf: i64, ns: i64, start: i64, end: i64) -> Result<()> {
		self.call(
			"nvim_buf_clear_namespace",
			vec![Value::Int(buf), Value::Int(ns), Value::Int(start), Value::Int(end)],
		)
		.map(drop)
	}

	/// `nvim_buf_add_highlight`. Returns the namespace id the host used.
	pub fn buf_add_highlight(&self, buf: i64, ns: i64, group: &str, line: u64, col_start: u64, col_end: i64) -> Result<i64> {
		let method = "nvim_buf_add_highlight";
		let v = self.call(method, add_highlight_args(buf, ns, group, line, col_start, col_end))?;
		v.as_i64().ok_or_else(|| unexpected(method, "integer", &v))
	}

	/// `nvim_create_namespace`
	pub fn create_namespace(&self, name: &str) -> Result<i64> {
		let method = "nvim_create_namespace";
		let v = self.call(method, vec![Value::from(name)])?;
		v.as_i64().ok_or_else(|| unexpected(method, "integer", &v))
	}

	/// `nvim_call_atomic`. Returns one result per batched call.
	pub fn call_atomic(&self, batch: AtomicBatch) -> Result<Vec<Value>> {
		let method = "nvim_call_atomic";
		if batch.is_empty() {
			return Ok(Vec::new());
		}
		let v = self.call(method, vec![batch.into_value()])?;
		parse_atomic_response(v)
	}

	/// `nvim_out_write`, detached.
	pub fn out_write(&self, msg: &str) {
		self.call_detached("nvim_out_write", vec![Value::from(msg)]);
	}

	/// `nvim_err_writeln`, detached.
	pub fn err_write(&self, msg: &str) {
		self.call_detached("nvim_err_writeln", vec![Value::from(msg)]);
	}

	/// `nvim_command`
	pub fn command(&self, cmd: &str) -> Result<()> {
		self.call("nvim_command", vec![Value::from(cmd)]).map(drop)
	}

	/// `nvim_get_var`
	pub fn get_var(&self, name: &str) -> Result<Value> {
		self.call("nvim_get_var", vec![Value::from(name)])
	}

	/// `nvim_set_client_info` for a remote plugin named `name`.
	pub fn set_client_info(&self, name: &str, version: &str) -> Result<()> {
		let version = Value::Map(vec![(Value::from("major"), Value::from(version))]);
		self.call(
			"nvim_set_client_info",
			vec![
				Value::from(name),
				version,
				Value::from("remote"),
				Value::Map(Vec::new()),
				Value::Map(Vec::new()),
			],
		)
		.map(drop)
	}

	/// `nvim_subscribe`
	pub fn subscribe(&self, event: &str) -> Result<()> {
		self.call("nvim_subscribe", vec![Value::from(event)]).map(drop)
	}
}

fn add_highlight_args(buf: i64, ns: i64, group: &str, line: u64, col_start: u64, col_end: i64) -> Vec<Value> {
	vec![
		Value::Int(buf),
		Value::Int(ns),
		Value::from(group),
		Value::UInt(line),
		Value::UInt(col_start),
		Value::Int(col_end),
	]
}

fn unexpected(method: &str, expected: &'static str, found: &Value) -> Error {
	Error::UnexpectedType {
		method: method.to_owned(),
		expected,
		found: found.type_name(),
	}
}

fn string_result(method: &str, v: &Value) -> Result<String> {
	v.as_bytes()
		.map(|b| String::from_utf8_lossy(b).into_owned())
		.ok_or_else(|| unexpected(method, "string", v))
}

/// An ordered list of calls executed by the host as one unit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AtomicBatch {
	calls: Vec<(String, Vec<Value>)>,
}

impl AtomicBatch {
	/// Creates an empty batch.
	pub fn new() -> Self {
		Self::default()
	}

	/// Appends a call.
	pub fn push(&mut self, method: &str, params: Vec<Value>) -> &mut Self {
		self.calls.push((method.to_owned(), params));
		self
	}

	/// Appends `nvim_buf_clear_namespace`.
	pub fn clear_namespace(&mut self, buf: i64, ns: i64, start: i64, end: i64) -> &mut Self {
		self.push(
			"nvim_buf_clear_namespace",
			vec![Value::Int(buf), Value::Int(ns), Value::Int(start), Value::Int(end)],
		)
	}

	/// Appends `nvim_buf_add_highlight`.
	pub fn add_highlight(&mut self, buf: i64, ns: i64, group: &str, line: u64, col_start: u64, col_end: i64) -> &mut Self {
		self.push("nvim_buf_add_highlight", add_highlight_args(buf, ns, group, line, col_start, col_end))
	}

	/// Number of calls.
	pub fn len(&self) -> usize {
		self.calls.len()
	}

	/// Returns true if no call was added.
	pub fn is_empty(&self) -> bool {
		self.calls.is_empty()
	}

	/// Method names in order.
	pub fn methods(&self) -> impl Iterator<Item = &str> {
		self.calls.iter().map(|(m, _)| m.as_str())
	}

	/// The `[[method, args], ...]` argument of `nvim_call_atomic`.
	pub fn into_value(self) -> Value {
		Value::Array(
			self.calls
				.into_iter()
				.map(|(method, params)| Value::Array(vec![Value::from(method), Value::Array(params)]))
				.collect(),
		)
	}
}

/// A batched call the host rejected.
///
/// Calls before `index` were executed; their results are in `completed`.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchError {
	/// Position of the failing call in the batch.
	pub index: usize,
	/// The host's error.
	pub error: RemoteError,
	/// Results of the calls that ran before the failure.
	pub completed: Vec<Value>,
}

impl std::fmt::Display for BatchError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "batched call {} failed: {}", self.index, self.error)
	}
}

/// Splits a `[results, error]` response.
pub(crate) fn parse_atomic_response(v: Value) -> Result<Vec<Value>> {
	let method = "nvim_call_atomic";
	let found = v.type_name();
	let Some(mut parts) = v.into_array().filter(|p| p.len() == 2) else {
		return Err(Error::UnexpectedType {
			method: method.into(),
			expected: "[results, error]",
			found,
		});
	};
	let error = parts.pop().unwrap_or(Value::Nil);
	let results = parts.pop().unwrap_or(Value::Nil);
	let found = results.type_name();
	let results = results.into_array().ok_or_else(|| Error::UnexpectedType {
		method: method.into(),
		expected: "array",
		found,
	})?;

	if error.is_nil() {
		return Ok(results);
	}
	let Some([index, kind, message]) = error.as_array() else {
		return Err(unexpected(method, "[index, type, message]", &error));
	};
	let index = index
		.as_u64()
		.and_then(|i| usize::try_from(i).ok())
		.ok_or_else(|| unexpected(method, "batch index", index))?;
	Err(Error::Batch(BatchError {
		index,
		error: RemoteError {
			kind: kind.as_i64(),
			message: message.as_bytes().map(|b| String::from_utf8_lossy(b).into_owned()).unwrap_or_default(),
		},
		completed: results,
	}))
}
