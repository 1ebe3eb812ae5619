//! Streaming entry decoder.
//!
//! Reads whole tag+payload entries out of a receive buffer using only
//! [`read_number`] and [`read_string`]. An entry that is not fully buffered
//! yet decodes to `None` and consumes nothing, so the caller can keep the
//! bytes and retry after the next read.

use bytes::Bytes;

use crate::{
    Entry, TagFamily, TypeTag,
    errors::{Result, WireError},
    reader::{read_number, read_string},
};

/// Decode the entry starting at `buffer[offset]`.
///
/// Returns `Ok(Some((consumed, entry)))` for a complete entry and `Ok(None)`
/// if more bytes are needed.
///
/// # Errors
///
/// - `WireError::BufferUnderflow` if `offset > buffer.len()`
/// - `WireError::InvalidMarker` if the tag byte is unknown or `TypeMarker`
pub fn decode_entry(buffer: &[u8], offset: usize) -> Result<Option<(usize, Entry)>> {
    let (read, marker) = read_number(TypeTag::TypeMarker.to_u8(), buffer, offset)?;
    if read == 0 {
        return Ok(None);
    }

    let raw = marker.as_i64() as u8;
    let tag = TypeTag::try_from(raw)?;
    let body = offset + read;

    let decoded = match tag.family() {
        TagFamily::Marker => return Err(WireError::InvalidMarker(raw)),
        TagFamily::Structural => Some((read, Entry::Structural(tag))),
        TagFamily::Unsigned | TagFamily::Signed => match read_number(raw, buffer, body)? {
            (0, _) => None,
            (width, value) => Some((read + width, Entry::Integer(tag, value.as_i64()))),
        },
        TagFamily::Float => match read_number(raw, buffer, body)? {
            (0, _) => None,
            (width, value) => Some((read + width, Entry::Float(tag, value.as_f64()))),
        },
        TagFamily::LengthPrefixed => {
            let (prefix, len) = read_number(raw, buffer, body)?;
            if prefix == 0 {
                return Ok(None);
            }

            let desired = len.as_i64() as usize;
            let (actual, bytes) = read_string(desired, buffer, body + prefix)?;
            (actual == desired).then(|| {
                (read + prefix + actual, Entry::Text(tag, Bytes::copy_from_slice(bytes)))
            })
        },
    };

    Ok(decoded)
}

/// Decode every complete entry in `buffer`.
///
/// Returns the entries and the number of bytes they span. Trailing bytes of an
/// incomplete entry are left for the caller.
///
/// # Errors
///
/// - `WireError::InvalidMarker` on the first malformed tag
pub fn decode_all(buffer: &[u8]) -> Result<(usize, Vec<Entry>)> {
    let mut offset = 0;
    let mut entries = Vec::new();

    while let Some((consumed, entry)) = decode_entry(buffer, offset)? {
        debug_assert!(consumed > 0);
        offset += consumed;
        entries.push(entry);
    }

    Ok((offset, entries))
}
