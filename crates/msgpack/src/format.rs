//! Building values from a compact format string.
//!
//! A format string describes the shape of one object:
//!
//! | Token | Meaning |
//! |-------|---------|
//! | `b` | boolean argument |
//! | `d`, `l` | signed integer argument |
//! | `u` | unsigned integer argument |
//! | `s`, `c` | string argument |
//! | `n` | nil (consumes no argument) |
//! | `[` ... `]` | array of the enclosed items |
//! | `{` ... `}` | map of the enclosed items, taken pairwise |
//!
//! The characters `:`, `;`, `,`, `.` and whitespace are separators with no meaning.
//! Letters are case-insensitive.
//!
//! ```
//! use taglight_msgpack::{Value, encode_fmt};
//!
//! let v = encode_fmt("[s, [d, u]]", &["nvim_buf_get_lines".into(), Value::Int(1), Value::UInt(2)]).unwrap();
//! assert_eq!(v.index(1).and_then(|a| a.index(0)), Some(&Value::Int(1)));
//! ```

use crate::{Error, Result, Value};

/// One meaningful token of a format string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatToken {
	/// `b`
	Bool,
	/// `d` or `l`
	Signed,
	/// `u`
	Unsigned,
	/// `s` or `c`
	Str,
	/// `n`
	Nil,
	/// `[`
	ArrayOpen,
	/// `]`
	ArrayClose,
	/// `{`
	MapOpen,
	/// `}`
	MapClose,
}

/// Iterator over the tokens of a format string, skipping separators.
///
/// Yields the byte offset of every token alongside it. An illegal character ends
/// the iteration with an error.
#[derive(Debug, Clone)]
pub struct FormatTokens<'a> {
	bytes: &'a [u8],
	pos: usize,
	failed: bool,
}

impl<'a> FormatTokens<'a> {
	/// Creates a tokenizer over `fmt`.
	pub fn new(fmt: &'a str) -> Self {
		Self {
			bytes: fmt.as_bytes(),
			pos: 0,
			failed: false,
		}
	}
}

impl Iterator for FormatTokens<'_> {
	type Item = Result<(usize, FormatToken)>;

	fn next(&mut self) -> Option<Self::Item> {
		if self.failed {
			return None;
		}
		while let Some(&byte) = self.bytes.get(self.pos) {
			let at = self.pos;
			self.pos += 1;
			let token = match byte.to_ascii_lowercase() {
				b'b' => FormatToken::Bool,
				b'd' | b'l' => FormatToken::Signed,
				b'u' => FormatToken::Unsigned,
				b's' | b'c' => FormatToken::Str,
				b'n' => FormatToken::Nil,
				b'[' => FormatToken::ArrayOpen,
				b']' => FormatToken::ArrayClose,
				b'{' => FormatToken::MapOpen,
				b'}' => FormatToken::MapClose,
				b':' | b';' | b',' | b'.' => continue,
				c if c.is_ascii_whitespace() => continue,
				c => {
					self.failed = true;
					return Some(Err(Error::Format(format!(
						"illegal character {:?} at offset {at}",
						char::from(c)
					))));
				}
			};
			return Some(Ok((at, token)));
		}
		None
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Open {
	Array,
	Map,
}

struct Frame {
	open: Open,
	at: usize,
	items: Vec<Value>,
}

/// Builds a single value described by `fmt`, filling scalar slots from `args` in order.
///
/// Every argument must be consumed exactly once and the format must describe exactly
/// one top-level value.
pub fn encode_fmt(fmt: &str, args: &[Value]) -> Result<Value> {
	let mut args = args.iter();
	let mut stack: Vec<Frame> = Vec::new();
	let mut top: Vec<Value> = Vec::with_capacity(1);

	for token in FormatTokens::new(fmt) {
		let (at, token) = token?;
		let value = match token {
			FormatToken::ArrayOpen | FormatToken::MapOpen => {
				let open = if token == FormatToken::ArrayOpen { Open::Array } else { Open::Map };
				stack.push(Frame { open, at, items: Vec::new() });
				continue;
			}
			FormatToken::ArrayClose | FormatToken::MapClose => {
				let want = if token == FormatToken::ArrayClose { Open::Array } else { Open::Map };
				let frame = match stack.pop() {
					Some(frame) if frame.open == want => frame,
					Some(frame) => {
						return Err(Error::Format(format!(
							"bracket at offset {at} does not close the one opened at offset {}",
							frame.at
						)));
					}
					None => return Err(Error::Format(format!("unmatched closing bracket at offset {at}"))),
				};
				close(frame)?
			}
			FormatToken::Nil => Value::Nil,
			scalar => {
				let arg = args
					.next()
					.ok_or_else(|| Error::Format(format!("missing argument for token at offset {at}")))?;
				convert(scalar, arg, at)?
			}
		};

		match stack.last_mut() {
			Some(frame) => frame.items.push(value),
			None => top.push(value),
		}
	}

	if let Some(frame) = stack.last() {
		return Err(Error::Format(format!("unclosed bracket at offset {}", frame.at)));
	}
	if args.next().is_some() {
		return Err(Error::Format("more arguments than format tokens".into()));
	}
	let mut top = top.into_iter();
	match (top.next(), top.next()) {
		(Some(value), None) => Ok(value),
		(None, _) => Err(Error::Format("format describes no value".into())),
		(Some(_), Some(_)) => Err(Error::Format("format describes more than one top-level value".into())),
	}
}

fn close(frame: Frame) -> Result<Value> {
	match frame.open {
		Open::Array => Ok(Value::Array(frame.items)),
		Open::Map => {
			if frame.items.len() % 2 != 0 {
				return Err(Error::Format(format!(
					"map opened at offset {} has an odd number of items",
					frame.at
				)));
			}
			let mut pairs = Vec::with_capacity(frame.items.len() / 2);
			let mut items = frame.items.into_iter();
			while let (Some(k), Some(v)) = (items.next(), items.next()) {
				pairs.push((k, v));
			}
			Ok(Value::Map(pairs))
		}
	}
}

fn convert(token: FormatToken, arg: &Value, at: usize) -> Result<Value> {
	let converted = match token {
		FormatToken::Bool => match arg {
			Value::Bool(b) => Some(Value::Bool(*b)),
			_ => None,
		},
		FormatToken::Signed => arg.as_i64().map(Value::Int),
		FormatToken::Unsigned => arg.as_u64().map(Value::UInt),
		FormatToken::Str => match arg {
			Value::String(_) => Some(arg.clone()),
			_ => None,
		},
		_ => None,
	};
	converted.ok_or_else(|| {
		Error::Format(format!(
			"argument of type {} does not match {token:?} at offset {at}",
			arg.type_name()
		))
	})
}
