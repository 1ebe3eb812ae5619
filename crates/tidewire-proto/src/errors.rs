//! Error types for the wire codec.
//!
//! Only hard failures live here. Running out of buffered bytes is never an
//! error; see the crate docs for the "not yet" sentinels.

use std::fmt;

use thiserror::Error;

use crate::TypeTag;

/// Result alias for codec operations.
pub type Result<T> = std::result::Result<T, WireError>;

/// The value representation a tag requires (or a queue entry carries).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Bare tag, no value
    Marker,
    /// Integer-like value
    Integer,
    /// Floating point value
    Float,
    /// Byte string value
    Text,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Marker => "no value",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Text => "string",
        };
        f.write_str(name)
    }
}

/// Hard codec failures.
///
/// Each variant aborts the whole call; no partial result is produced.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WireError {
    /// Read offset lies past the end of the buffer
    #[error("buffer underflow: offset {offset} is past the end of a {len}-byte buffer")]
    BufferUnderflow {
        /// Offset supplied by the caller
        offset: usize,
        /// Length of the buffer
        len: usize,
    },

    /// Tag byte is unknown, or not valid for the requested operation
    #[error("invalid marker {0} encountered")]
    InvalidMarker(u8),

    /// Queue entry value does not match the family its tag requires
    #[error("invalid value for {tag}: expected {expected}, found {found}")]
    TypeMismatch {
        /// Tag of the offending entry
        tag: TypeTag,
        /// Representation the tag requires
        expected: ValueKind,
        /// Representation the entry carried
        found: ValueKind,
    },

    /// Integer value does not fit the tag's width and signedness
    #[error("value {value} out of range for {tag} ({min}..={max})")]
    ValueOutOfRange {
        /// Tag of the offending entry
        tag: TypeTag,
        /// Value supplied
        value: i64,
        /// Smallest representable value
        min: i64,
        /// Largest representable value
        max: i64,
    },

    /// String is longer than the tag's length prefix can describe
    #[error("string of {len} bytes does not fit {tag} (max {max})")]
    LengthOverflow {
        /// Tag of the offending entry
        tag: TypeTag,
        /// Length of the string
        len: usize,
        /// Largest length the prefix can encode
        max: usize,
    },

    /// Encoded output would exceed the bounded buffer
    #[error("buffer exceeded, wrong expected size supplied (need {needed} bytes, capacity {capacity})")]
    BufferExceeded {
        /// Bytes required by the write that failed
        needed: usize,
        /// Fixed capacity of the output buffer
        capacity: usize,
    },

    /// Size hint of zero passed to the writer
    #[error("invalid write buffer length: size hint must be nonzero")]
    ZeroSizeHint,

    /// Output buffer could not be allocated
    #[error("could not allocate {size} bytes for the write buffer")]
    AllocationFailed {
        /// Requested capacity
        size: usize,
    },
}
