//! Strict decoding of a single object.

use std::io::{self, Read};

use crate::marker::{self, Kind, Width};
use crate::{Error, Result, Value};

/// Nesting limit for arrays and maps. Deeper input is treated as corrupt.
const MAX_DEPTH: usize = 512;

/// Largest chunk read from a stream at once when a payload length is not yet trusted.
const STREAM_CHUNK: usize = 64 * 1024;

/// Input for the decoder.
trait Source {
	/// Fills `buf` completely or fails with a protocol error.
	fn fill(&mut self, buf: &mut [u8]) -> Result<()>;

	/// Number of bytes left, when the input has a known extent.
	fn remaining(&self) -> Option<usize>;

	/// Reads exactly `len` payload bytes.
	fn take(&mut self, len: usize) -> Result<Vec<u8>>;
}

struct SliceSource<'a, 'b> {
	input: &'a mut &'b [u8],
}

impl Source for SliceSource<'_, '_> {
	fn fill(&mut self, buf: &mut [u8]) -> Result<()> {
		let bytes = self.take_slice(buf.len())?;
		buf.copy_from_slice(bytes);
		Ok(())
	}

	fn remaining(&self) -> Option<usize> {
		Some(self.input.len())
	}

	fn take(&mut self, len: usize) -> Result<Vec<u8>> {
		self.take_slice(len).map(<[u8]>::to_vec)
	}
}

impl<'b> SliceSource<'_, 'b> {
	fn take_slice(&mut self, len: usize) -> Result<&'b [u8]> {
		if len > self.input.len() {
			return Err(Error::protocol(format!(
				"truncated object: need {len} bytes, {} available",
				self.input.len()
			)));
		}
		let input: &'b [u8] = *self.input;
		let (head, tail) = input.split_at(len);
		*self.input = tail;
		Ok(head)
	}
}

struct StreamSource<R> {
	reader: R,
}

impl<R: Read> Source for StreamSource<R> {
	fn fill(&mut self, buf: &mut [u8]) -> Result<()> {
		self.reader.read_exact(buf).map_err(truncation)
	}

	fn remaining(&self) -> Option<usize> {
		None
	}

	fn take(&mut self, len: usize) -> Result<Vec<u8>> {
		let mut out = Vec::with_capacity(len.min(STREAM_CHUNK));
		let mut left = len;
		let mut chunk = [0u8; 4096];
		while left > 0 {
			let n = left.min(chunk.len());
			self.fill(&mut chunk[..n])?;
			out.extend_from_slice(&chunk[..n]);
			left -= n;
		}
		Ok(out)
	}
}

fn truncation(err: io::Error) -> Error {
	if err.kind() == io::ErrorKind::UnexpectedEof {
		Error::protocol("stream ended inside an object")
	} else {
		Error::Io(err)
	}
}

/// Decodes one object from the front of `input`, advancing it past the object.
///
/// Fails with [`Error::Protocol`] if the object is incomplete or malformed, in which
/// case `input` is left at an unspecified position. An empty input is [`Error::Eof`].
pub fn decode_slice(input: &mut &[u8]) -> Result<Value> {
	if input.is_empty() {
		return Err(Error::Eof);
	}
	let mut src = SliceSource { input };
	let mut tag = [0u8; 1];
	src.fill(&mut tag)?;
	decode_tagged(&mut src, tag[0], 0)
}

/// Decodes one object from a blocking stream.
///
/// Returns [`Error::Eof`] if the stream ends before the first byte; ending anywhere
/// later is a protocol error.
pub fn decode_from<R: Read>(reader: R) -> Result<Value> {
	let mut src = StreamSource { reader };
	let mut tag = [0u8; 1];
	loop {
		match src.reader.read(&mut tag) {
			Ok(0) => return Err(Error::Eof),
			Ok(_) => break,
			Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
			Err(e) => return Err(Error::Io(e)),
		}
	}
	decode_tagged(&mut src, tag[0], 0)
}

fn decode_value(src: &mut impl Source, depth: usize) -> Result<Value> {
	let mut tag = [0u8; 1];
	src.fill(&mut tag)?;
	decode_tagged(src, tag[0], depth)
}

fn decode_tagged(src: &mut impl Source, tag: u8, depth: usize) -> Result<Value> {
	let kind = marker::classify(tag)
		.ok_or_else(|| Error::protocol(format!("unrecognized tag byte {tag:#04x}")))?;

	let value = match kind {
		Kind::PosFixInt => Value::UInt(u64::from(tag)),
		// Low five bits, sign-extended.
		Kind::NegFixInt => Value::Int(i64::from(tag as i8)),
		Kind::Nil => Value::Nil,
		Kind::False => Value::Bool(false),
		Kind::True => Value::Bool(true),
		Kind::FixStr => Value::String(src.take(usize::from(tag & 0x1f))?),
		Kind::Str(w) => {
			let len = read_len(src, w)?;
			Value::String(take_payload(src, len)?)
		}
		Kind::Bin(w) => {
			let len = read_len(src, w)?;
			Value::Binary(take_payload(src, len)?)
		}
		Kind::UInt(w) => Value::UInt(read_uint(src, w)?),
		Kind::Int(w) => Value::Int(read_int(src, w)?),
		Kind::Float32 => {
			let mut buf = [0u8; 4];
			src.fill(&mut buf)?;
			Value::Float(f64::from(f32::from_be_bytes(buf)))
		}
		Kind::Float64 => {
			let mut buf = [0u8; 8];
			src.fill(&mut buf)?;
			Value::Float(f64::from_be_bytes(buf))
		}
		Kind::FixExt(len) => {
			let ty = read_ext_type(src)?;
			Value::Ext(ty, src.take(len)?)
		}
		Kind::Ext(w) => {
			let len = read_len(src, w)?;
			let ty = read_ext_type(src)?;
			Value::Ext(ty, take_payload(src, len)?)
		}
		Kind::FixArray => decode_array(src, usize::from(tag & 0x0f), depth)?,
		Kind::Array(w) => {
			let len = read_len(src, w)?;
			decode_array(src, len, depth)?
		}
		Kind::FixMap => decode_map(src, usize::from(tag & 0x0f), depth)?,
		Kind::Map(w) => {
			let len = read_len(src, w)?;
			decode_map(src, len, depth)?
		}
	};

	Ok(value)
}

fn decode_array(src: &mut impl Source, len: usize, depth: usize) -> Result<Value> {
	check_container(src, len, 1, depth)?;
	let mut items = Vec::with_capacity(len.min(1024));
	for _ in 0..len {
		items.push(decode_value(src, depth + 1)?);
	}
	Ok(Value::Array(items))
}

fn decode_map(src: &mut impl Source, len: usize, depth: usize) -> Result<Value> {
	check_container(src, len, 2, depth)?;
	let mut pairs = Vec::with_capacity(len.min(1024));
	for _ in 0..len {
		let key = decode_value(src, depth + 1)?;
		let value = decode_value(src, depth + 1)?;
		pairs.push((key, value));
	}
	Ok(Value::Map(pairs))
}

/// Every element occupies at least one byte, so a declared count larger than the
/// remaining input can be rejected before any element is read.
fn check_container(src: &impl Source, len: usize, per_entry: usize, depth: usize) -> Result<()> {
	if depth >= MAX_DEPTH {
		return Err(Error::protocol(format!("nesting deeper than {MAX_DEPTH} levels")));
	}
	if let Some(remaining) = src.remaining() {
		let needed = len.saturating_mul(per_entry);
		if needed > remaining {
			return Err(Error::protocol(format!(
				"container declares {len} entries but only {remaining} bytes remain"
			)));
		}
	}
	Ok(())
}

fn take_payload(src: &mut impl Source, len: usize) -> Result<Vec<u8>> {
	if let Some(remaining) = src.remaining()
		&& len > remaining
	{
		return Err(Error::protocol(format!(
			"payload declares {len} bytes but only {remaining} remain"
		)));
	}
	src.take(len)
}

fn read_ext_type(src: &mut impl Source) -> Result<i8> {
	let mut buf = [0u8; 1];
	src.fill(&mut buf)?;
	Ok(buf[0] as i8)
}

fn read_len(src: &mut impl Source, width: Width) -> Result<usize> {
	let n = read_uint(src, width)?;
	usize::try_from(n).map_err(|_| Error::protocol(format!("length {n} does not fit in memory")))
}

fn read_uint(src: &mut impl Source, width: Width) -> Result<u64> {
	let mut buf = [0u8; 8];
	let n = width.bytes();
	src.fill(&mut buf[8 - n..])?;
	Ok(u64::from_be_bytes(buf))
}

fn read_int(src: &mut impl Source, width: Width) -> Result<i64> {
	let raw = read_uint(src, width)?;
	let value = match width {
		Width::W8 => i64::from(raw as u8 as i8),
		Width::W16 => i64::from(raw as u16 as i16),
		Width::W32 => i64::from(raw as u32 as i32),
		Width::W64 => raw as i64,
	};
	Ok(value)
}
