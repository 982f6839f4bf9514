//! Decoding host notifications.

use taglight_msgpack::Value;

/// Buffer-lines-changed notification.
pub const LINES_EVENT: &str = "nvim_buf_lines_event";
/// Change-counter-only notification.
pub const CHANGEDTICK_EVENT: &str = "nvim_buf_changedtick_event";
/// Buffer detach notification.
pub const DETACH_EVENT: &str = "nvim_buf_detach_event";
/// Session notification sent by the plugin's autocommands.
pub const UPDATE_EVENT: &str = "vim_event_update";

/// Host-side user events bridged through [`UPDATE_EVENT`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExternalUpdate {
	/// A buffer was created or read.
	BufNew,
	/// The current buffer changed.
	BufChanged,
	/// The current buffer's filetype or syntax changed.
	SyntaxChanged,
	/// Rebuild the project cache of the current buffer.
	UpdateTags,
	/// Recompute highlights of the current buffer.
	ForceUpdate,
	/// Remove highlights from the current buffer.
	ClearBuffer,
	/// Detach everything and stop.
	Stop,
	/// The host is exiting.
	Exit,
}

impl ExternalUpdate {
	/// Maps the wire code to an update.
	pub fn from_code(code: u64) -> Option<Self> {
		Some(match code {
			0 => Self::BufNew,
			1 => Self::BufChanged,
			2 => Self::SyntaxChanged,
			3 => Self::UpdateTags,
			4 => Self::ForceUpdate,
			5 => Self::ClearBuffer,
			6 => Self::Stop,
			7 => Self::Exit,
			_ => return None,
		})
	}
}

/// A decoded notification.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
	/// Lines `[first, last)` of `buffer` were replaced by `lines`.
	Lines {
		/// Buffer number.
		buffer: i64,
		/// New change counter; absent when the change did not bump it.
		tick: Option<u64>,
		/// First replaced line.
		first: i64,
		/// End of the replaced range, or -1 for an initial update.
		last: i64,
		/// Replacement lines.
		lines: Vec<Vec<u8>>,
		/// True if more events complete this change.
		more: bool,
	},
	/// The change counter moved without a text change.
	ChangedTick {
		/// Buffer number.
		buffer: i64,
		/// New change counter.
		tick: u64,
	},
	/// The host stopped sending updates for `buffer`.
	Detach {
		/// Buffer number.
		buffer: i64,
	},
	/// A session-level user event.
	External(ExternalUpdate),
}

/// Why a notification could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
	/// The method is not one the session handles.
	#[error("unhandled notification {0}")]
	UnknownMethod(String),
	/// The parameters do not have the documented shape.
	#[error("malformed {method}: {reason}")]
	Malformed {
		/// The notification method.
		method: &'static str,
		/// What was wrong.
		reason: &'static str,
	},
}

impl Event {
	/// Decodes a notification's method and positional parameters.
	pub fn parse(method: &str, params: Vec<Value>) -> Result<Self, EventError> {
		match method {
			LINES_EVENT => parse_lines(params),
			CHANGEDTICK_EVENT => {
				let buffer = buffer_param(CHANGEDTICK_EVENT, &params)?;
				let tick = params
					.get(1)
					.and_then(Value::as_u64)
					.ok_or(malformed(CHANGEDTICK_EVENT, "changedtick is not an unsigned integer"))?;
				Ok(Self::ChangedTick { buffer, tick })
			}
			DETACH_EVENT => Ok(Self::Detach {
				buffer: buffer_param(DETACH_EVENT, &params)?,
			}),
			UPDATE_EVENT => {
				let code = params
					.first()
					.and_then(Value::as_u64)
					.ok_or(malformed(UPDATE_EVENT, "missing update code"))?;
				ExternalUpdate::from_code(code)
					.map(Self::External)
					.ok_or(malformed(UPDATE_EVENT, "unknown update code"))
			}
			other => Err(EventError::UnknownMethod(other.to_owned())),
		}
	}

	/// The buffer the event targets, if any.
	pub fn buffer(&self) -> Option<i64> {
		match self {
			Self::Lines { buffer, .. } | Self::ChangedTick { buffer, .. } | Self::Detach { buffer } => Some(*buffer),
			Self::External(_) => None,
		}
	}
}

fn malformed(method: &'static str, reason: &'static str) -> EventError {
	EventError::Malformed { method, reason }
}

fn buffer_param(method: &'static str, params: &[Value]) -> Result<i64, EventError> {
	params
		.first()
		.and_then(Value::as_handle)
		.ok_or(malformed(method, "first parameter is not a buffer"))
}

/// `[buffer, changedtick, first, last, lines, more]`
fn parse_lines(params: Vec<Value>) -> Result<Event, EventError> {
	let buffer = buffer_param(LINES_EVENT, &params)?;
	let Ok([_, tick, first, last, lines, more]) = <[Value; 6]>::try_from(params) else {
		return Err(malformed(LINES_EVENT, "expected six parameters"));
	};

	let tick = if tick.is_nil() {
		None
	} else {
		Some(tick.as_u64().ok_or(malformed(LINES_EVENT, "changedtick is not an unsigned integer"))?)
	};
	let first = first.as_i64().ok_or(malformed(LINES_EVENT, "first line is not an integer"))?;
	let last = last.as_i64().ok_or(malformed(LINES_EVENT, "last line is not an integer"))?;
	let more = more.as_bool().ok_or(malformed(LINES_EVENT, "more flag is not a boolean"))?;
	let lines = lines
		.into_array()
		.ok_or(malformed(LINES_EVENT, "lines is not an array"))?
		.into_iter()
		.map(|line| match line {
			Value::String(bytes) => Ok(bytes),
			_ => Err(malformed(LINES_EVENT, "line is not a string")),
		})
		.collect::<Result<_, _>>()?;

	Ok(Event::Lines {
		buffer,
		tick,
		first,
		last,
		lines,
		more,
	})
}
