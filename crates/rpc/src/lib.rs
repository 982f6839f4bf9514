//! MessagePack-RPC plumbing for talking to the host editor.
//!
//! This crate provides the blocking, thread-based RPC layer:
//! * [`Message`]: the request/response/notification envelopes
//! * [`CorrelationTable`]: matches responses to outstanding calls across connections
//! * [`Connection`]: request sending plus the per-connection reader loop
//! * [`Nvim`]: typed wrappers for the host API, including [`AtomicBatch`] calls

#![warn(missing_docs)]

pub mod connection;
pub mod nvim;
pub mod protocol;
pub mod table;

pub use connection::{Connection, NotificationHandler};
pub use nvim::{AtomicBatch, BatchError, Nvim};
pub use protocol::{CounterIdGen, Message, RemoteError};
pub use table::{ConnectionId, CorrelationTable, PendingResponse};

/// A convenient type alias for `Result` with `E` = [`enum@crate::Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// RPC errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// The byte stream could not be decoded.
	#[error("{0}")]
	Codec(#[from] taglight_msgpack::Error),
	/// A decoded object is not a valid envelope.
	#[error("protocol error: {0}")]
	Protocol(String),
	/// The host answered with an error.
	#[error("remote error: {0}")]
	Remote(RemoteError),
	/// One call of an atomic batch failed.
	#[error("{0}")]
	Batch(BatchError),
	/// The connection went away before the response arrived.
	#[error("the connection stopped before the call completed")]
	ServiceStopped,
	/// No response arrived within the configured timeout.
	#[error("call to {method} timed out")]
	Timeout {
		/// The method that was called.
		method: String,
	},
	/// Input/output errors while writing.
	#[error("{0}")]
	Io(#[from] std::io::Error),
	/// The host's result did not have the expected shape.
	#[error("{method} returned {found}, expected {expected}")]
	UnexpectedType {
		/// The method that was called.
		method: String,
		/// What the caller needed.
		expected: &'static str,
		/// What arrived.
		found: &'static str,
	},
}

impl Error {
	/// Returns true if the error means the connection can no longer be used.
	pub fn is_fatal(&self) -> bool {
		matches!(self, Self::Codec(_) | Self::Protocol(_) | Self::ServiceStopped | Self::Io(_))
	}
}
