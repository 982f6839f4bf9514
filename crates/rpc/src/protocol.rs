//! The three envelope shapes carried over the wire.

use std::sync::atomic::{AtomicU64, Ordering};

use taglight_msgpack::Value;

use crate::{Error, Result};

const REQUEST: u64 = 0;
const RESPONSE: u64 = 1;
const NOTIFICATION: u64 = 2;

/// Counter-based request id generator, one per connection.
///
/// Ids start at 0 and increase by one per request. Shared by every thread calling
/// through the same connection.
#[derive(Debug, Default)]
pub struct CounterIdGen(AtomicU64);

impl CounterIdGen {
	/// Creates a new counter starting at 0.
	#[must_use]
	pub const fn new() -> Self {
		Self(AtomicU64::new(0))
	}

	/// Generates the next unique id and increments the counter.
	#[allow(clippy::should_implement_trait, reason = "convention")]
	pub fn next(&self) -> u64 {
		self.0.fetch_add(1, Ordering::Relaxed)
	}
}

/// A decoded RPC envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
	/// `[0, id, method, params]`
	Request {
		/// Caller-chosen id echoed by the response.
		id: u64,
		/// Method name.
		method: String,
		/// Positional arguments.
		params: Vec<Value>,
	},
	/// `[1, id, error, result]`. Exactly one of error and result is meaningful.
	Response {
		/// Id of the request being answered.
		id: u64,
		/// The result, or the error object when the error slot is not nil.
		result: std::result::Result<Value, Value>,
	},
	/// `[2, method, params]`
	Notification {
		/// Method name.
		method: String,
		/// Positional arguments.
		params: Vec<Value>,
	},
}

impl Message {
	/// Classifies a decoded object as one of the envelope shapes.
	///
	/// Anything else is a protocol error: the peer is not speaking MessagePack-RPC.
	pub fn from_value(value: Value) -> Result<Self> {
		let found = value.type_name();
		let Some(mut fields) = value.into_array() else {
			return Err(Error::Protocol(format!("envelope is a {found}, not an array")));
		};
		let kind = fields.first().and_then(Value::as_u64);

		match (kind, fields.len()) {
			(Some(REQUEST), 4) => {
				let params = take_params(fields.pop())?;
				let method = take_method(fields.pop())?;
				let id = take_id(fields.pop())?;
				Ok(Self::Request { id, method, params })
			}
			(Some(RESPONSE), 4) => {
				let result = fields.pop().unwrap_or(Value::Nil);
				let error = fields.pop().unwrap_or(Value::Nil);
				let id = take_id(fields.pop())?;
				let result = if error.is_nil() { Ok(result) } else { Err(error) };
				Ok(Self::Response { id, result })
			}
			(Some(NOTIFICATION), 3) => {
				let params = take_params(fields.pop())?;
				let method = take_method(fields.pop())?;
				Ok(Self::Notification { method, params })
			}
			(kind, len) => Err(Error::Protocol(format!(
				"unrecognized envelope: type {kind:?} with {len} fields"
			))),
		}
	}

	/// Builds the wire object for this envelope.
	pub fn into_value(self) -> Value {
		match self {
			Self::Request { id, method, params } => Value::Array(vec![
				Value::UInt(REQUEST),
				Value::UInt(id),
				Value::from(method),
				Value::Array(params),
			]),
			Self::Response { id, result } => {
				let (error, result) = match result {
					Ok(result) => (Value::Nil, result),
					Err(error) => (error, Value::Nil),
				};
				Value::Array(vec![Value::UInt(RESPONSE), Value::UInt(id), error, result])
			}
			Self::Notification { method, params } => Value::Array(vec![
				Value::UInt(NOTIFICATION),
				Value::from(method),
				Value::Array(params),
			]),
		}
	}
}

fn take_id(field: Option<Value>) -> Result<u64> {
	field
		.as_ref()
		.and_then(Value::as_u64)
		.ok_or_else(|| Error::Protocol("envelope id is not an unsigned integer".into()))
}

fn take_method(field: Option<Value>) -> Result<String> {
	match field {
		Some(Value::String(bytes)) => String::from_utf8(bytes).map_err(|_| Error::Protocol("method name is not UTF-8".into())),
		_ => Err(Error::Protocol("envelope method is not a string".into())),
	}
}

fn take_params(field: Option<Value>) -> Result<Vec<Value>> {
	field
		.and_then(Value::into_array)
		.ok_or_else(|| Error::Protocol("envelope params are not an array".into()))
}

/// An error object returned by the host in a response.
///
/// The host sends `[kind, message]`; anything else is kept as its rendered form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
	/// Host-defined error class, when present.
	pub kind: Option<i64>,
	/// Human readable message.
	pub message: String,
}

impl RemoteError {
	/// Interprets a response error slot.
	pub fn from_value(value: &Value) -> Self {
		if let Some([kind, message]) = value.as_array()
			&& let Some(message) = message.as_bytes()
		{
			return Self {
				kind: kind.as_i64(),
				message: String::from_utf8_lossy(message).into_owned(),
			};
		}
		if let Some(message) = value.as_bytes() {
			return Self {
				kind: None,
				message: String::from_utf8_lossy(message).into_owned(),
			};
		}
		Self {
			kind: None,
			message: value.to_string(),
		}
	}
}

impl std::fmt::Display for RemoteError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self.kind {
			Some(kind) => write!(f, "{} (kind {kind})", self.message),
			None => f.write_str(&self.message),
		}
	}
}
