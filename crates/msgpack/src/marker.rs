//! Static classification table for leading tag bytes.

/// Byte width of a length or scalar field following a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Width {
	W8,
	W16,
	W32,
	W64,
}

impl Width {
	pub(crate) const fn bytes(self) -> usize {
		match self {
			Self::W8 => 1,
			Self::W16 => 2,
			Self::W32 => 4,
			Self::W64 => 8,
		}
	}
}

/// What a tag byte announces.
///
/// Fixed kinds carry their payload (or its length) in the low bits of the tag itself;
/// sized kinds are followed by a big-endian length or scalar of the given width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Kind {
	PosFixInt,
	NegFixInt,
	FixMap,
	FixArray,
	FixStr,
	Nil,
	False,
	True,
	Bin(Width),
	Ext(Width),
	/// Fixed-size extension with the given payload length.
	FixExt(usize),
	Float32,
	Float64,
	UInt(Width),
	Int(Width),
	Str(Width),
	Array(Width),
	Map(Width),
}

/// One row of the marker table: an inclusive tag range and its meaning.
struct Entry {
	first: u8,
	last: u8,
	kind: Kind,
}

const fn entry(first: u8, last: u8, kind: Kind) -> Entry {
	Entry { first, last, kind }
}

const fn single(tag: u8, kind: Kind) -> Entry {
	Entry { first: tag, last: tag, kind }
}

/// Every tag byte the codec accepts. `0xc1` is reserved by the format and deliberately
/// absent.
static TABLE: [Entry; 36] = [
	entry(0x00, 0x7f, Kind::PosFixInt),
	entry(0x80, 0x8f, Kind::FixMap),
	entry(0x90, 0x9f, Kind::FixArray),
	entry(0xa0, 0xbf, Kind::FixStr),
	single(0xc0, Kind::Nil),
	single(0xc2, Kind::False),
	single(0xc3, Kind::True),
	single(0xc4, Kind::Bin(Width::W8)),
	single(0xc5, Kind::Bin(Width::W16)),
	single(0xc6, Kind::Bin(Width::W32)),
	single(0xc7, Kind::Ext(Width::W8)),
	single(0xc8, Kind::Ext(Width::W16)),
	single(0xc9, Kind::Ext(Width::W32)),
	single(0xca, Kind::Float32),
	single(0xcb, Kind::Float64),
	single(0xcc, Kind::UInt(Width::W8)),
	single(0xcd, Kind::UInt(Width::W16)),
	single(0xce, Kind::UInt(Width::W32)),
	single(0xcf, Kind::UInt(Width::W64)),
	single(0xd0, Kind::Int(Width::W8)),
	single(0xd1, Kind::Int(Width::W16)),
	single(0xd2, Kind::Int(Width::W32)),
	single(0xd3, Kind::Int(Width::W64)),
	single(0xd4, Kind::FixExt(1)),
	single(0xd5, Kind::FixExt(2)),
	single(0xd6, Kind::FixExt(4)),
	single(0xd7, Kind::FixExt(8)),
	single(0xd8, Kind::FixExt(16)),
	single(0xd9, Kind::Str(Width::W8)),
	single(0xda, Kind::Str(Width::W16)),
	single(0xdb, Kind::Str(Width::W32)),
	single(0xdc, Kind::Array(Width::W16)),
	single(0xdd, Kind::Array(Width::W32)),
	single(0xde, Kind::Map(Width::W16)),
	single(0xdf, Kind::Map(Width::W32)),
	entry(0xe0, 0xff, Kind::NegFixInt),
];

/// Looks up the kind announced by a tag byte.
pub(crate) fn classify(tag: u8) -> Option<Kind> {
	TABLE
		.iter()
		.find(|e| (e.first..=e.last).contains(&tag))
		.map(|e| e.kind)
}

pub(crate) const NIL: u8 = 0xc0;
pub(crate) const FALSE: u8 = 0xc2;
pub(crate) const TRUE: u8 = 0xc3;
pub(crate) const BIN8: u8 = 0xc4;
pub(crate) const BIN16: u8 = 0xc5;
pub(crate) const BIN32: u8 = 0xc6;
pub(crate) const EXT8: u8 = 0xc7;
pub(crate) const EXT16: u8 = 0xc8;
pub(crate) const EXT32: u8 = 0xc9;
pub(crate) const FLOAT64: u8 = 0xcb;
pub(crate) const UINT8: u8 = 0xcc;
pub(crate) const UINT16: u8 = 0xcd;
pub(crate) const UINT32: u8 = 0xce;
pub(crate) const UINT64: u8 = 0xcf;
pub(crate) const INT8: u8 = 0xd0;
pub(crate) const INT16: u8 = 0xd1;
pub(crate) const INT32: u8 = 0xd2;
pub(crate) const INT64: u8 = 0xd3;
pub(crate) const FIXEXT1: u8 = 0xd4;
pub(crate) const FIXEXT2: u8 = 0xd5;
pub(crate) const FIXEXT4: u8 = 0xd6;
pub(crate) const FIXEXT8: u8 = 0xd7;
pub(crate) const FIXEXT16: u8 = 0xd8;
pub(crate) const STR8: u8 = 0xd9;
pub(crate) const STR16: u8 = 0xda;
pub(crate) const STR32: u8 = 0xdb;
pub(crate) const ARRAY16: u8 = 0xdc;
pub(crate) const ARRAY32: u8 = 0xdd;
pub(crate) const MAP16: u8 = 0xde;
pub(crate) const MAP32: u8 = 0xdf;

pub(crate) const FIXMAP_BASE: u8 = 0x80;
pub(crate) const FIXARRAY_BASE: u8 = 0x90;
pub(crate) const FIXSTR_BASE: u8 = 0xa0;
