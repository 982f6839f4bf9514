//! MessagePack object model and codec.
//!
//! This crate implements the subset of MessagePack spoken by the host editor's RPC
//! channel, from scratch:
//! * [`Value`]: the decoded object tree
//! * [`decode_slice`] / [`decode_from`]: strict decoding from a buffer or a stream
//! * [`encode`]: smallest-representation encoding into a growable buffer
//! * [`encode_fmt`]: building values from a compact format string
//!
//! Decoding is all-or-nothing. A tag byte with no entry in the marker table, a length
//! that runs past the available input, or a truncated stream is an [`Error::Protocol`];
//! no partially populated value is ever returned.

#![warn(missing_docs)]

mod decode;
mod encode;
pub mod format;
mod marker;
mod value;

use std::io;

pub use decode::{decode_from, decode_slice};
pub use encode::{encode, encode_to};
pub use format::{FormatToken, FormatTokens, encode_fmt};
pub use value::{HandleKind, Value};

/// A convenient type alias for `Result` with `E` = [`enum@crate::Error`].
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Codec errors.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
	/// The byte stream does not form a valid object. The peer and this side have
	/// desynchronized; the stream cannot be resumed.
	#[error("protocol error: {0}")]
	Protocol(String),
	/// The stream ended cleanly before the first byte of an object.
	#[error("the underlying stream reached EOF")]
	Eof,
	/// Input/output errors from the underlying stream.
	#[error("{0}")]
	Io(#[from] io::Error),
	/// A format string or its arguments were malformed.
	#[error("format error: {0}")]
	Format(String),
}

impl Error {
	pub(crate) fn protocol(msg: impl Into<String>) -> Self {
		Self::Protocol(msg.into())
	}
}
