//! The decoded object model.

use std::fmt;

/// A MessagePack object.
///
/// `Array` and `Map` always hold exactly the number of elements their wire header
/// declared; maps keep their pairs in wire order.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
	/// The nil object.
	Nil,
	/// A boolean.
	Bool(bool),
	/// A signed integer, decoded from the negative fixint or `int *` families.
	Int(i64),
	/// An unsigned integer, decoded from the positive fixint or `uint *` families.
	UInt(u64),
	/// A floating point number (`float 32` is widened on decode).
	Float(f64),
	/// A string. The bytes are not required to be valid UTF-8.
	String(Vec<u8>),
	/// A binary blob.
	Binary(Vec<u8>),
	/// An ordered sequence of objects.
	Array(Vec<Value>),
	/// An ordered sequence of key/value pairs.
	Map(Vec<(Value, Value)>),
	/// An application-defined extension: a type byte and an opaque payload.
	Ext(i8, Vec<u8>),
}

/// Editor handle types carried as extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
	/// A buffer handle (extension type 0).
	Buffer,
	/// A window handle (extension type 1).
	Window,
	/// A tabpage handle (extension type 2).
	Tabpage,
}

impl HandleKind {
	/// Returns the extension type byte used on the wire.
	pub const fn ext_type(self) -> i8 {
		match self {
			Self::Buffer => 0,
			Self::Window => 1,
			Self::Tabpage => 2,
		}
	}

	fn from_ext_type(ty: i8) -> Option<Self> {
		match ty {
			0 => Some(Self::Buffer),
			1 => Some(Self::Window),
			2 => Some(Self::Tabpage),
			_ => None,
		}
	}
}

impl Value {
	/// Creates a string value from anything byte-like.
	pub fn string(s: impl AsRef<[u8]>) -> Self {
		Self::String(s.as_ref().to_vec())
	}

	/// Creates an editor handle extension whose payload is the encoded handle number.
	pub fn handle(kind: HandleKind, num: i64) -> Self {
		let mut payload = Vec::with_capacity(9);
		crate::encode(&Self::from(num), &mut payload);
		Self::Ext(kind.ext_type(), payload)
	}

	/// Returns true for [`Value::Nil`].
	pub fn is_nil(&self) -> bool {
		matches!(self, Self::Nil)
	}

	/// Returns the value as a `u64` if it is a non-negative integer.
	pub fn as_u64(&self) -> Option<u64> {
		match *self {
			Self::UInt(n) => Some(n),
			Self::Int(n) => u64::try_from(n).ok(),
			_ => None,
		}
	}

	/// Returns the value as an `i64` if it is an integer that fits.
	pub fn as_i64(&self) -> Option<i64> {
		match *self {
			Self::Int(n) => Some(n),
			Self::UInt(n) => i64::try_from(n).ok(),
			_ => None,
		}
	}

	/// Returns the value as a boolean. Integers are accepted as C-style truth values.
	pub fn as_bool(&self) -> Option<bool> {
		match *self {
			Self::Bool(b) => Some(b),
			Self::Int(n) => Some(n != 0),
			Self::UInt(n) => Some(n != 0),
			_ => None,
		}
	}

	/// Returns the bytes of a string or binary value.
	pub fn as_bytes(&self) -> Option<&[u8]> {
		match self {
			Self::String(s) | Self::Binary(s) => Some(s),
			_ => None,
		}
	}

	/// Returns a string value as `&str` if it is valid UTF-8.
	pub fn as_str(&self) -> Option<&str> {
		match self {
			Self::String(s) => std::str::from_utf8(s).ok(),
			_ => None,
		}
	}

	/// Returns the elements of an array.
	pub fn as_array(&self) -> Option<&[Value]> {
		match self {
			Self::Array(a) => Some(a),
			_ => None,
		}
	}

	/// Consumes an array value, returning its elements.
	pub fn into_array(self) -> Option<Vec<Value>> {
		match self {
			Self::Array(a) => Some(a),
			_ => None,
		}
	}

	/// Returns the pairs of a map.
	pub fn as_map(&self) -> Option<&[(Value, Value)]> {
		match self {
			Self::Map(m) => Some(m),
			_ => None,
		}
	}

	/// Looks up a string key in a map. The first matching pair wins.
	pub fn map_get(&self, key: &str) -> Option<&Value> {
		self.as_map()?
			.iter()
			.find(|(k, _)| k.as_bytes() == Some(key.as_bytes()))
			.map(|(_, v)| v)
	}

	/// Returns the array element at `index`.
	pub fn index(&self, index: usize) -> Option<&Value> {
		self.as_array()?.get(index)
	}

	/// Interprets the value as an editor handle number.
	///
	/// Handles arrive as extensions whose payload is itself an encoded integer. Plain
	/// integers are accepted as well since the host sends buffer numbers both ways.
	pub fn as_handle(&self) -> Option<i64> {
		match self {
			Self::Ext(ty, payload) => {
				HandleKind::from_ext_type(*ty)?;
				let mut rest = payload.as_slice();
				let inner = crate::decode_slice(&mut rest).ok()?;
				if !rest.is_empty() {
					return None;
				}
				inner.as_i64()
			}
			other => other.as_i64(),
		}
	}

	/// Returns a short name for the variant, for diagnostics.
	pub fn type_name(&self) -> &'static str {
		match self {
			Self::Nil => "nil",
			Self::Bool(_) => "bool",
			Self::Int(_) => "int",
			Self::UInt(_) => "uint",
			Self::Float(_) => "float",
			Self::String(_) => "string",
			Self::Binary(_) => "binary",
			Self::Array(_) => "array",
			Self::Map(_) => "map",
			Self::Ext(..) => "ext",
		}
	}
}

impl From<bool> for Value {
	fn from(b: bool) -> Self {
		Self::Bool(b)
	}
}

impl From<i64> for Value {
	fn from(n: i64) -> Self {
		Self::Int(n)
	}
}

impl From<i32> for Value {
	fn from(n: i32) -> Self {
		Self::Int(i64::from(n))
	}
}

impl From<u64> for Value {
	fn from(n: u64) -> Self {
		Self::UInt(n)
	}
}

impl From<u32> for Value {
	fn from(n: u32) -> Self {
		Self::UInt(u64::from(n))
	}
}

impl From<f64> for Value {
	fn from(f: f64) -> Self {
		Self::Float(f)
	}
}

impl From<&str> for Value {
	fn from(s: &str) -> Self {
		Self::String(s.as_bytes().to_vec())
	}
}

impl From<String> for Value {
	fn from(s: String) -> Self {
		Self::String(s.into_bytes())
	}
}

impl From<Vec<Value>> for Value {
	fn from(a: Vec<Value>) -> Self {
		Self::Array(a)
	}
}

impl<T: Into<Value>> From<Option<T>> for Value {
	fn from(opt: Option<T>) -> Self {
		opt.map_or(Self::Nil, Into::into)
	}
}

/// Compact single-line rendering used in log output.
impl fmt::Display for Value {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::Nil => f.write_str("nil"),
			Self::Bool(b) => write!(f, "{b}"),
			Self::Int(n) => write!(f, "{n}"),
			Self::UInt(n) => write!(f, "{n}"),
			Self::Float(x) => write!(f, "{x}"),
			Self::String(s) => write!(f, "{:?}", String::from_utf8_lossy(s)),
			Self::Binary(b) => write!(f, "<binary {} bytes>", b.len()),
			Self::Array(items) => {
				f.write_str("[")?;
				for (i, item) in items.iter().enumerate() {
					if i > 0 {
						f.write_str(", ")?;
					}
					write!(f, "{item}")?;
				}
				f.write_str("]")
			}
			Self::Map(pairs) => {
				f.write_str("{")?;
				for (i, (k, v)) in pairs.iter().enumerate() {
					if i > 0 {
						f.write_str(", ")?;
					}
					write!(f, "{k}: {v}")?;
				}
				f.write_str("}")
			}
			Self::Ext(ty, payload) => match self.as_handle() {
				Some(num) => write!(f, "ext({ty}: {num})"),
				None => write!(f, "ext({ty}: {} bytes)", payload.len()),
			},
		}
	}
}
