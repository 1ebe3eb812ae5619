//! Bounds-checked reads.
//!
//! Both readers take the whole receive buffer plus an offset so callers can
//! walk a buffer that is still filling up. An offset past the end is a caller
//! bug and fails hard. Too few bytes after a valid offset is normal for a
//! stream and returns the "not yet" sentinel instead.

use crate::{
    TagFamily, TypeTag,
    byte_order::from_wire,
    errors::{Result, WireError},
};

/// A decoded number, widened to 64 bits.
///
/// Unsigned 32-bit values always fit in [`Number::Int`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    /// Any integer tag, or a length prefix
    Int(i64),
    /// FLOAT (widened) or DOUBLE
    Float(f64),
}

impl Number {
    /// Value paired with a zero byte count to mean "not enough data yet".
    pub const ZERO: Number = Number::Int(0);

    /// Integer view. Floats truncate toward zero.
    #[must_use]
    pub fn as_i64(self) -> i64 {
        match self {
            Self::Int(v) => v,
            Self::Float(v) => v as i64,
        }
    }

    /// Floating point view.
    #[must_use]
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Int(v) => v as f64,
            Self::Float(v) => v,
        }
    }
}

/// Decode one number encoded under `marker` at `buffer[offset..]`.
///
/// Returns `(bytes_consumed, value)`. `(0, Number::ZERO)` means fewer bytes
/// than the tag's width are buffered; call again once more data arrives.
///
/// `marker` may be [`TypeTag::TypeMarker`] (reads the next tag byte), any
/// scalar tag, or a string tag (reads its length prefix).
///
/// # Errors
///
/// - `WireError::BufferUnderflow` if `offset > buffer.len()`
/// - `WireError::InvalidMarker` if `marker` is unknown or structural
pub fn read_number(marker: u8, buffer: &[u8], offset: usize) -> Result<(usize, Number)> {
    let remaining = remaining_after(buffer, offset)?;
    let tag = TypeTag::try_from(marker)?;
    if tag.is_structural() {
        return Err(WireError::InvalidMarker(marker));
    }

    let width = tag.width();
    debug_assert!(width > 0);
    if remaining.len() < width {
        return Ok((0, Number::ZERO));
    }

    let value = match (tag.family(), width) {
        (TagFamily::Marker | TagFamily::Unsigned | TagFamily::LengthPrefixed, 1) => {
            Number::Int(i64::from(fixed::<1>(remaining)[0]))
        },
        (TagFamily::Unsigned | TagFamily::LengthPrefixed, 2) => {
            Number::Int(i64::from(u16::from_ne_bytes(from_wire(fixed(remaining)))))
        },
        (TagFamily::Unsigned | TagFamily::LengthPrefixed, 4) => {
            Number::Int(i64::from(u32::from_ne_bytes(from_wire(fixed(remaining)))))
        },
        (TagFamily::Signed, 1) => Number::Int(i64::from(i8::from_ne_bytes(fixed(remaining)))),
        (TagFamily::Signed, 2) => {
            Number::Int(i64::from(i16::from_ne_bytes(from_wire(fixed(remaining)))))
        },
        (TagFamily::Signed, 4) => {
            Number::Int(i64::from(i32::from_ne_bytes(from_wire(fixed(remaining)))))
        },
        (TagFamily::Signed, 8) => Number::Int(i64::from_ne_bytes(from_wire(fixed(remaining)))),
        (TagFamily::Float, 4) => {
            Number::Float(f64::from(f32::from_ne_bytes(from_wire(fixed(remaining)))))
        },
        (TagFamily::Float, 8) => Number::Float(f64::from_ne_bytes(from_wire(fixed(remaining)))),
        _ => return Err(WireError::InvalidMarker(marker)),
    };

    Ok((width, value))
}

/// Read up to `desired` raw bytes at `buffer[offset..]`.
///
/// Returns `(actual_len, bytes)` with `actual_len = min(desired, remaining)`.
/// A short result is not an error: compare `actual_len` against `desired` to
/// tell a complete read from a partial one.
///
/// # Errors
///
/// - `WireError::BufferUnderflow` if `offset > buffer.len()`
pub fn read_string(desired: usize, buffer: &[u8], offset: usize) -> Result<(usize, &[u8])> {
    let remaining = remaining_after(buffer, offset)?;
    let bytes = &remaining[..desired.min(remaining.len())];
    Ok((bytes.len(), bytes))
}

fn remaining_after(buffer: &[u8], offset: usize) -> Result<&[u8]> {
    buffer.get(offset..).ok_or(WireError::BufferUnderflow { offset, len: buffer.len() })
}

/// First `N` bytes of `bytes`. Callers check the length first.
fn fixed<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes[..N]);
    out
}
