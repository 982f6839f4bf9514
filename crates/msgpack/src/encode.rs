//! Smallest-representation encoding.

use std::io::{self, Write};

use crate::Value;
use crate::marker::*;

/// Appends the encoding of `value` to `out`.
///
/// Every value picks the narrowest wire form its family allows. Non-negative
/// [`Value::Int`]s stay in the signed `int *` family so they decode back as `Int`;
/// positive fixints are reserved for [`Value::UInt`].
///
/// Strings, binaries, extensions, arrays and maps are limited to `u32::MAX` bytes or
/// entries, the widest length header the format has. Longer values are a caller bug.
pub fn encode(value: &Value, out: &mut Vec<u8>) {
	match value {
		Value::Nil => out.push(NIL),
		Value::Bool(false) => out.push(FALSE),
		Value::Bool(true) => out.push(TRUE),
		Value::UInt(n) => encode_uint(*n, out),
		Value::Int(n) => encode_int(*n, out),
		Value::Float(x) => {
			out.push(FLOAT64);
			out.extend_from_slice(&x.to_be_bytes());
		}
		Value::String(s) => {
			encode_str_header(s.len(), out);
			out.extend_from_slice(s);
		}
		Value::Binary(b) => {
			encode_sized(b.len(), [BIN8, BIN16, BIN32], out);
			out.extend_from_slice(b);
		}
		Value::Array(items) => {
			encode_container_header(items.len(), FIXARRAY_BASE, ARRAY16, ARRAY32, out);
			for item in items {
				encode(item, out);
			}
		}
		Value::Map(pairs) => {
			encode_container_header(pairs.len(), FIXMAP_BASE, MAP16, MAP32, out);
			for (k, v) in pairs {
				encode(k, out);
				encode(v, out);
			}
		}
		Value::Ext(ty, payload) => {
			match payload.len() {
				1 => out.push(FIXEXT1),
				2 => out.push(FIXEXT2),
				4 => out.push(FIXEXT4),
				8 => out.push(FIXEXT8),
				16 => out.push(FIXEXT16),
				len => encode_sized(len, [EXT8, EXT16, EXT32], out),
			}
			out.push(*ty as u8);
			out.extend_from_slice(payload);
		}
	}
}

/// Encodes `value` and writes it to `writer` in a single `write_all`.
pub fn encode_to<W: Write>(value: &Value, mut writer: W) -> io::Result<()> {
	let mut buf = Vec::with_capacity(64);
	encode(value, &mut buf);
	writer.write_all(&buf)
}

fn encode_uint(n: u64, out: &mut Vec<u8>) {
	if n <= 0x7f {
		out.push(n as u8);
	} else if let Ok(n) = u8::try_from(n) {
		out.push(UINT8);
		out.push(n);
	} else if let Ok(n) = u16::try_from(n) {
		out.push(UINT16);
		out.extend_from_slice(&n.to_be_bytes());
	} else if let Ok(n) = u32::try_from(n) {
		out.push(UINT32);
		out.extend_from_slice(&n.to_be_bytes());
	} else {
		out.push(UINT64);
		out.extend_from_slice(&n.to_be_bytes());
	}
}

fn encode_int(n: i64, out: &mut Vec<u8>) {
	if (-32..0).contains(&n) {
		out.push(n as i8 as u8);
	} else if let Ok(n) = i8::try_from(n) {
		out.push(INT8);
		out.push(n as u8);
	} else if let Ok(n) = i16::try_from(n) {
		out.push(INT16);
		out.extend_from_slice(&n.to_be_bytes());
	} else if let Ok(n) = i32::try_from(n) {
		out.push(INT32);
		out.extend_from_slice(&n.to_be_bytes());
	} else {
		out.push(INT64);
		out.extend_from_slice(&n.to_be_bytes());
	}
}

fn encode_str_header(len: usize, out: &mut Vec<u8>) {
	if len < 32 {
		out.push(FIXSTR_BASE | len as u8);
	} else {
		encode_sized(len, [STR8, STR16, STR32], out);
	}
}

/// Writes one of the 8/16/32-bit length-prefixed headers.
fn encode_sized(len: usize, tags: [u8; 3], out: &mut Vec<u8>) {
	if let Ok(n) = u8::try_from(len) {
		out.push(tags[0]);
		out.push(n);
	} else if let Ok(n) = u16::try_from(len) {
		out.push(tags[1]);
		out.extend_from_slice(&n.to_be_bytes());
	} else {
		let n = header_len(len);
		out.push(tags[2]);
		out.extend_from_slice(&n.to_be_bytes());
	}
}

fn encode_container_header(len: usize, fix_base: u8, tag16: u8, tag32: u8, out: &mut Vec<u8>) {
	if len < 16 {
		out.push(fix_base | len as u8);
	} else if let Ok(n) = u16::try_from(len) {
		out.push(tag16);
		out.extend_from_slice(&n.to_be_bytes());
	} else {
		let n = header_len(len);
		out.push(tag32);
		out.extend_from_slice(&n.to_be_bytes());
	}
}

/// Length for a 32-bit header.
pub(crate) fn header_len(len: usize) -> u32 {
	debug_assert!(len <= u32::MAX as usize, "length {len} does not fit a msgpack header");
	u32::try_from(len).unwrap_or(u32::MAX)
}
