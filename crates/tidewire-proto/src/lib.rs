//! Tidewire wire codec.
//!
//! A compact, type-tagged binary format. Every encoded value starts with a
//! one-byte [`TypeTag`]:
//!
//! - Structural tags (map/array/dict start, record end, nil, true, false) are
//!   the tag byte alone.
//! - Scalar tags are followed by a fixed-width Big Endian payload (1, 2, 4 or 8
//!   bytes).
//! - String tags are followed by a Big Endian length prefix (1, 2 or 4 bytes)
//!   and exactly that many raw bytes.
//!
//! # Components
//!
//! - [`byte_order`]: native <-> wire (Big Endian) conversion
//! - [`TypeTag`]: the tag table and per-tag metadata
//! - [`read_number`] / [`read_string`]: bounds-checked, restartable reads
//! - [`serialize`]: encode a [`WriteQueue`] into one bounded buffer
//! - [`decode_entry`]: streaming decoder producing [`Entry`] values
//!
//! # Partial data
//!
//! Reads never fail because bytes have not arrived yet. A short buffer yields
//! the "not yet" sentinel (`(0, Number::ZERO)` for numbers, a truncated slice
//! for strings, `None` for the entry decoder) and the caller retries once more
//! bytes are buffered. Hard errors are reserved for caller mistakes and
//! malformed input.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod byte_order;
mod decoder;
mod errors;
mod reader;
mod tag;
mod writer;

pub use decoder::{decode_all, decode_entry};
pub use errors::{Result, ValueKind, WireError};
pub use reader::{Number, read_number, read_string};
pub use tag::{TagFamily, TagInfo, TypeTag};
pub use writer::{Entry, SERIALIZE_SLACK, WriteQueue, serialize};
