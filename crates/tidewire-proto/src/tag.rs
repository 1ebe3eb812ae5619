//! Type tags.
//!
//! A tag is the one-byte marker that opens every encoded value and fixes how
//! the following bytes are decoded. The mapping is total: every known tag has
//! exactly one decoding rule and every other byte is rejected.

use std::fmt;

use crate::errors::{ValueKind, WireError};

/// One-byte type marker.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    /// Placeholder used to read the next tag byte itself
    TypeMarker = 1,
    /// Start of a map
    MapStart = 2,
    /// Start of an array
    ArrayStart = 3,
    /// Start of a dictionary
    DictStart = 4,
    /// End of the current map/array/dictionary
    RecordEnd = 5,
    /// Nil value
    Nil = 6,
    /// Boolean true
    BoolTrue = 7,
    /// Boolean false
    BoolFalse = 8,
    /// Unsigned 8-bit integer
    Uint8 = 9,
    /// Dictionary key index, 8-bit
    DictEntry = 10,
    /// Unsigned 16-bit integer
    Uint16 = 11,
    /// Dictionary key index, 16-bit
    BigDictEntry = 12,
    /// Unsigned 32-bit integer
    Uint32 = 13,
    /// Signed 8-bit integer
    Int8 = 14,
    /// Signed 16-bit integer
    Int16 = 15,
    /// Signed 32-bit integer
    Int32 = 16,
    /// Signed 64-bit integer
    Int64 = 17,
    /// IEEE 754 single precision float
    Float = 18,
    /// IEEE 754 double precision float
    Double = 19,
    /// String with a 1-byte length prefix
    String = 20,
    /// String with a 2-byte length prefix
    BigString = 21,
    /// String with a 4-byte length prefix
    HugeString = 22,
}

/// How the bytes after a tag are laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagFamily {
    /// The tag byte that introduces a value, read as an unsigned byte
    Marker,
    /// Tag byte only
    Structural,
    /// Fixed-width unsigned integer
    Unsigned,
    /// Fixed-width signed integer
    Signed,
    /// Fixed-width IEEE float
    Float,
    /// Length prefix followed by raw bytes
    LengthPrefixed,
}

/// Static metadata for one tag.
///
/// `size` is the documented payload size (0 for the marker placeholder);
/// `min`/`max` document the representable range and drive encode-time range
/// checks for integer tags.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TagInfo {
    /// Upper-case tag name
    pub name: &'static str,
    /// Tag value
    pub tag: TypeTag,
    /// Documented payload size in bytes
    pub size: usize,
    /// Smallest representable value
    pub min: f64,
    /// Largest representable value
    pub max: f64,
}

impl TypeTag {
    /// Every tag, in wire value order.
    pub const ALL: [TypeTag; 22] = [
        Self::TypeMarker,
        Self::MapStart,
        Self::ArrayStart,
        Self::DictStart,
        Self::RecordEnd,
        Self::Nil,
        Self::BoolTrue,
        Self::BoolFalse,
        Self::Uint8,
        Self::DictEntry,
        Self::Uint16,
        Self::BigDictEntry,
        Self::Uint32,
        Self::Int8,
        Self::Int16,
        Self::Int32,
        Self::Int64,
        Self::Float,
        Self::Double,
        Self::String,
        Self::BigString,
        Self::HugeString,
    ];

    /// Parse a tag byte. `None` for unknown values.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        let index = usize::from(value).checked_sub(1)?;
        Self::ALL.get(index).copied()
    }

    /// Tag as its wire byte.
    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Layout family of the bytes after the tag.
    #[must_use]
    pub fn family(self) -> TagFamily {
        match self {
            Self::TypeMarker => TagFamily::Marker,
            Self::MapStart
            | Self::ArrayStart
            | Self::DictStart
            | Self::RecordEnd
            | Self::Nil
            | Self::BoolTrue
            | Self::BoolFalse => TagFamily::Structural,
            Self::Uint8 | Self::DictEntry | Self::Uint16 | Self::BigDictEntry | Self::Uint32 => {
                TagFamily::Unsigned
            },
            Self::Int8 | Self::Int16 | Self::Int32 | Self::Int64 => TagFamily::Signed,
            Self::Float | Self::Double => TagFamily::Float,
            Self::String | Self::BigString | Self::HugeString => TagFamily::LengthPrefixed,
        }
    }

    /// True for tags that carry no payload.
    #[must_use]
    pub fn is_structural(self) -> bool {
        self.family() == TagFamily::Structural
    }

    /// Bytes following the tag that `read_number` decodes.
    ///
    /// For scalars this is the value width, for strings the length prefix
    /// width, for the marker placeholder the tag byte itself. Structural tags
    /// have no numeric payload and report 0.
    #[must_use]
    pub fn width(self) -> usize {
        match self {
            Self::MapStart
            | Self::ArrayStart
            | Self::DictStart
            | Self::RecordEnd
            | Self::Nil
            | Self::BoolTrue
            | Self::BoolFalse => 0,
            Self::TypeMarker | Self::Uint8 | Self::DictEntry | Self::Int8 | Self::String => 1,
            Self::Uint16 | Self::BigDictEntry | Self::Int16 | Self::BigString => 2,
            Self::Uint32 | Self::Int32 | Self::Float | Self::HugeString => 4,
            Self::Int64 | Self::Double => 8,
        }
    }

    /// Representation a queue entry must carry for this tag.
    ///
    /// `None` for the marker placeholder, which never appears in a queue.
    #[must_use]
    pub fn value_kind(self) -> Option<ValueKind> {
        match self.family() {
            TagFamily::Marker => None,
            TagFamily::Structural => Some(ValueKind::Marker),
            TagFamily::Unsigned | TagFamily::Signed => Some(ValueKind::Integer),
            TagFamily::Float => Some(ValueKind::Float),
            TagFamily::LengthPrefixed => Some(ValueKind::Text),
        }
    }

    /// Inclusive integer range for integer tags and string length prefixes.
    #[must_use]
    pub fn int_range(self) -> Option<(i64, i64)> {
        let range = match self {
            Self::Uint8 | Self::DictEntry | Self::String => (0, i64::from(u8::MAX)),
            Self::Uint16 | Self::BigDictEntry | Self::BigString => (0, i64::from(u16::MAX)),
            Self::Uint32 | Self::HugeString => (0, i64::from(u32::MAX)),
            Self::Int8 => (i64::from(i8::MIN), i64::from(i8::MAX)),
            Self::Int16 => (i64::from(i16::MIN), i64::from(i16::MAX)),
            Self::Int32 => (i64::from(i32::MIN), i64::from(i32::MAX)),
            Self::Int64 => (i64::MIN, i64::MAX),
            _ => return None,
        };
        Some(range)
    }

    /// Upper-case name, as used in diagnostics.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::TypeMarker => "TYPE_MARKER",
            Self::MapStart => "MAP_START",
            Self::ArrayStart => "ARRAY_START",
            Self::DictStart => "DICT_START",
            Self::RecordEnd => "RECORD_END",
            Self::Nil => "NIL",
            Self::BoolTrue => "BOOL_TRUE",
            Self::BoolFalse => "BOOL_FALSE",
            Self::Uint8 => "UINT_8",
            Self::DictEntry => "DICT_ENTRY",
            Self::Uint16 => "UINT_16",
            Self::BigDictEntry => "BIG_DICT_ENTRY",
            Self::Uint32 => "UINT_32",
            Self::Int8 => "INT_8",
            Self::Int16 => "INT_16",
            Self::Int32 => "INT_32",
            Self::Int64 => "INT_64",
            Self::Float => "FLOAT",
            Self::Double => "DOUBLE",
            Self::String => "STRING",
            Self::BigString => "BIG_STRING",
            Self::HugeString => "HUGE_STRING",
        }
    }

    /// Metadata row for this tag.
    #[must_use]
    pub fn info(self) -> TagInfo {
        let (size, min, max) = match self.family() {
            TagFamily::Marker => (0, -1.0, -1.0),
            TagFamily::Structural => {
                let v = f64::from(self.to_u8());
                (1, v, v)
            },
            TagFamily::Float if self == Self::Float => {
                (4, -f64::from(f32::MAX), f64::from(f32::MAX))
            },
            TagFamily::Float => (8, -f64::MAX, f64::MAX),
            TagFamily::Unsigned | TagFamily::Signed | TagFamily::LengthPrefixed => {
                let (min, max) = self.int_range().unwrap_or((0, 0));
                (self.width(), min as f64, max as f64)
            },
        };

        TagInfo { name: self.name(), tag: self, size, min, max }
    }
}

impl TryFrom<u8> for TypeTag {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_u8(value).ok_or(WireError::InvalidMarker(value))
    }
}

impl From<TypeTag> for u8 {
    fn from(tag: TypeTag) -> Self {
        tag.to_u8()
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
