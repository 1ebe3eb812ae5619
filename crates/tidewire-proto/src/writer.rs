//! Write queue and bounded serializer.
//!
//! A [`WriteQueue`] is an ordered list of tagged values. [`serialize`] encodes
//! it in one pass into a buffer whose capacity is fixed up front from the
//! caller's size hint. Running out of room is a sizing mistake on the caller's
//! side and fails the call; the buffer is never grown.

use bytes::Bytes;

use crate::{
    TagFamily, TypeTag, ValueKind,
    byte_order::to_wire,
    errors::{Result, WireError},
};

/// Extra bytes allocated beyond the caller's size hint.
pub const SERIALIZE_SLACK: usize = 64;

/// One queue entry: a tag and the value its family requires.
#[derive(Debug, Clone, PartialEq)]
pub enum Entry {
    /// Tag byte only (map/array/dict start, record end, nil, booleans)
    Structural(TypeTag),
    /// Integer tags and dictionary key indices
    Integer(TypeTag, i64),
    /// FLOAT or DOUBLE
    Float(TypeTag, f64),
    /// Length-prefixed string
    Text(TypeTag, Bytes),
}

impl Entry {
    /// Tag this entry is encoded under.
    #[must_use]
    pub fn tag(&self) -> TypeTag {
        match self {
            Self::Structural(tag)
            | Self::Integer(tag, _)
            | Self::Float(tag, _)
            | Self::Text(tag, _) => *tag,
        }
    }

    /// Representation carried by this entry.
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Structural(_) => ValueKind::Marker,
            Self::Integer(..) => ValueKind::Integer,
            Self::Float(..) => ValueKind::Float,
            Self::Text(..) => ValueKind::Text,
        }
    }

    /// Bytes this entry occupies on the wire, tag byte included.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        let payload = match self {
            Self::Text(tag, bytes) => tag.width() + bytes.len(),
            other => other.tag().width(),
        };
        1 + payload
    }
}

/// Ordered entries awaiting encoding.
///
/// Consumed by value by [`serialize`]; nothing is retained after encoding.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteQueue {
    entries: Vec<Entry>,
}

impl WriteQueue {
    /// Create an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a bare tag.
    pub fn marker(&mut self, tag: TypeTag) -> &mut Self {
        self.push(Entry::Structural(tag))
    }

    /// Append an integer under `tag`.
    pub fn int(&mut self, tag: TypeTag, value: i64) -> &mut Self {
        self.push(Entry::Integer(tag, value))
    }

    /// Append a float under `tag`.
    pub fn float(&mut self, tag: TypeTag, value: f64) -> &mut Self {
        self.push(Entry::Float(tag, value))
    }

    /// Append a string under `tag`.
    pub fn text(&mut self, tag: TypeTag, value: impl Into<Bytes>) -> &mut Self {
        self.push(Entry::Text(tag, value.into()))
    }

    /// Append an already-built entry.
    pub fn push(&mut self, entry: Entry) -> &mut Self {
        self.entries.push(entry);
        self
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no entries are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exact encoded size of the queue, usable as a size hint.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        self.entries.iter().map(Entry::encoded_len).sum()
    }

    /// Borrow the entries in order.
    #[must_use]
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }
}

impl FromIterator<Entry> for WriteQueue {
    fn from_iter<I: IntoIterator<Item = Entry>>(iter: I) -> Self {
        Self { entries: iter.into_iter().collect() }
    }
}

impl Extend<Entry> for WriteQueue {
    fn extend<I: IntoIterator<Item = Entry>>(&mut self, iter: I) {
        self.entries.extend(iter);
    }
}

impl IntoIterator for WriteQueue {
    type Item = Entry;
    type IntoIter = std::vec::IntoIter<Entry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// Encode `queue` into one contiguous buffer.
///
/// The output buffer holds at most `size_hint + SERIALIZE_SLACK` bytes. The
/// returned [`Bytes`] covers only what was written.
///
/// # Errors
///
/// - `WireError::ZeroSizeHint` if `size_hint` is 0, whatever the queue holds
/// - `WireError::AllocationFailed` if the bounded buffer cannot be allocated
/// - `WireError::InvalidMarker` for a `TypeMarker` entry
/// - `WireError::TypeMismatch` if an entry's value does not fit its tag family
/// - `WireError::ValueOutOfRange` if an integer does not fit its tag
/// - `WireError::LengthOverflow` if a string is too long for its prefix
/// - `WireError::BufferExceeded` if the encoding outgrows the buffer
pub fn serialize(queue: WriteQueue, size_hint: usize) -> Result<Bytes> {
    if size_hint == 0 {
        return Err(WireError::ZeroSizeHint);
    }

    let capacity = size_hint.saturating_add(SERIALIZE_SLACK);
    let mut writer = BoundedWriter::with_capacity(capacity)?;
    for entry in queue {
        writer.entry(&entry)?;
    }

    debug_assert!(writer.buf.len() <= capacity);
    Ok(Bytes::from(writer.buf))
}

/// Fixed-capacity byte sink.
struct BoundedWriter {
    buf: Vec<u8>,
    capacity: usize,
}

impl BoundedWriter {
    fn with_capacity(capacity: usize) -> Result<Self> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(capacity)
            .map_err(|_| WireError::AllocationFailed { size: capacity })?;
        Ok(Self { buf, capacity })
    }

    fn put(&mut self, bytes: &[u8]) -> Result<()> {
        let needed = self.buf.len() + bytes.len();
        if needed > self.capacity {
            return Err(WireError::BufferExceeded { needed, capacity: self.capacity });
        }
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    fn entry(&mut self, entry: &Entry) -> Result<()> {
        let tag = entry.tag();
        let Some(expected) = tag.value_kind() else {
            return Err(WireError::InvalidMarker(tag.to_u8()));
        };
        let found = entry.kind();
        if expected != found {
            return Err(WireError::TypeMismatch { tag, expected, found });
        }

        match entry {
            Entry::Structural(_) => self.put(&[tag.to_u8()]),
            Entry::Integer(_, value) => {
                check_range(tag, *value)?;
                self.put(&[tag.to_u8()])?;
                self.uint(tag.width(), *value as u64)
            },
            Entry::Float(_, value) => {
                self.put(&[tag.to_u8()])?;
                if tag.width() == 4 {
                    self.put(&to_wire((*value as f32).to_ne_bytes()))
                } else {
                    self.put(&to_wire(value.to_ne_bytes()))
                }
            },
            Entry::Text(_, bytes) => {
                debug_assert_eq!(tag.family(), TagFamily::LengthPrefixed);
                let max = tag.int_range().map_or(0, |(_, max)| max as usize);
                if bytes.len() > max {
                    return Err(WireError::LengthOverflow { tag, len: bytes.len(), max });
                }
                self.put(&[tag.to_u8()])?;
                self.uint(tag.width(), bytes.len() as u64)?;
                self.put(bytes)
            },
        }
    }

    /// Low `width` bytes of `value`, Big Endian. Callers range-check first.
    fn uint(&mut self, width: usize, value: u64) -> Result<()> {
        match width {
            1 => self.put(&[value as u8]),
            2 => self.put(&to_wire((value as u16).to_ne_bytes())),
            4 => self.put(&to_wire((value as u32).to_ne_bytes())),
            _ => self.put(&to_wire(value.to_ne_bytes())),
        }
    }
}

fn check_range(tag: TypeTag, value: i64) -> Result<()> {
    match tag.int_range() {
        Some((min, max)) if (min..=max).contains(&value) => Ok(()),
        Some((min, max)) => Err(WireError::ValueOutOfRange { tag, value, min, max }),
        None => Err(WireError::InvalidMarker(tag.to_u8())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uint16_scenario() {
        let mut queue = WriteQueue::new();
        queue.int(TypeTag::Uint16, 300);

        let out = serialize(queue, 2).unwrap();
        assert_eq!(&out[..], &[TypeTag::Uint16.to_u8(), 0x01, 0x2C]);
    }

    #[test]
    fn short_string_scenario() {
        let mut queue = WriteQueue::new();
        queue.text(TypeTag::String, "hello");

        let out = serialize(queue, 7).unwrap();
        assert_eq!(&out[..], &[TypeTag::String.to_u8(), 0x05, b'h', b'e', b'l', b'l', b'o']);
    }

    #[test]
    fn structural_tags_are_one_byte() {
        let mut queue = WriteQueue::new();
        queue
            .marker(TypeTag::MapStart)
            .marker(TypeTag::Nil)
            .marker(TypeTag::BoolTrue)
            .marker(TypeTag::RecordEnd);

        let out = serialize(queue, 1).unwrap();
        assert_eq!(&out[..], &[2, 6, 7, 5]);
    }

    #[test]
    fn negative_integers_are_twos_complement() {
        let mut queue = WriteQueue::new();
        queue.int(TypeTag::Int8, -1).int(TypeTag::Int16, -2).int(TypeTag::Int64, -1);

        let out = serialize(queue, 16).unwrap();
        assert_eq!(
            &out[..],
            &[14, 0xFF, 15, 0xFF, 0xFE, 17, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]
        );
    }

    #[test]
    fn floats_use_their_tag_width() {
        let mut queue = WriteQueue::new();
        queue.float(TypeTag::Float, 1.5).float(TypeTag::Double, 1.5);

        let out = serialize(queue, 12).unwrap();
        assert_eq!(out.len(), 1 + 4 + 1 + 8);
        assert_eq!(&out[1..5], &1.5f32.to_be_bytes());
        assert_eq!(&out[6..], &1.5f64.to_be_bytes());
    }

    #[test]
    fn zero_hint_rejected_even_for_empty_queue() {
        assert_eq!(serialize(WriteQueue::new(), 0), Err(WireError::ZeroSizeHint));
    }

    #[test]
    fn overrun_past_slack_rejected() {
        let mut queue = WriteQueue::new();
        queue.text(TypeTag::BigString, vec![b'x'; 100]);

        let err = serialize(queue, 1).unwrap_err();
        assert!(matches!(err, WireError::BufferExceeded { capacity: 65, .. }));
    }

    #[test]
    fn exactly_filling_the_buffer_is_fine() {
        let mut queue = WriteQueue::new();
        queue.text(TypeTag::String, vec![b'x'; 63]);

        let out = serialize(queue, 1).unwrap();
        assert_eq!(out.len(), 1 + SERIALIZE_SLACK);
    }

    #[test]
    fn type_marker_entry_rejected() {
        let mut queue = WriteQueue::new();
        queue.marker(TypeTag::TypeMarker);

        let err = serialize(queue, 8).unwrap_err();
        assert_eq!(err, WireError::InvalidMarker(TypeTag::TypeMarker.to_u8()));
        assert_eq!(err.to_string(), "invalid marker 1 encountered");
    }

    #[test]
    fn family_mismatch_names_both_sides() {
        let mut queue = WriteQueue::new();
        queue.text(TypeTag::Int32, "nope");

        let err = serialize(queue, 8).unwrap_err();
        assert_eq!(
            err,
            WireError::TypeMismatch {
                tag: TypeTag::Int32,
                expected: ValueKind::Integer,
                found: ValueKind::Text,
            }
        );
        assert_eq!(err.to_string(), "invalid value for INT_32: expected integer, found string");
    }

    #[test]
    fn structural_entry_with_scalar_tag_rejected() {
        let mut queue = WriteQueue::new();
        queue.marker(TypeTag::Uint8);

        let err = serialize(queue, 8).unwrap_err();
        assert!(matches!(err, WireError::TypeMismatch { found: ValueKind::Marker, .. }));
    }

    #[test]
    fn out_of_range_integer_rejected() {
        let mut queue = WriteQueue::new();
        queue.int(TypeTag::Uint8, 256);

        let err = serialize(queue, 8).unwrap_err();
        assert_eq!(
            err,
            WireError::ValueOutOfRange { tag: TypeTag::Uint8, value: 256, min: 0, max: 255 }
        );
    }

    #[test]
    fn over_long_string_rejected() {
        let mut queue = WriteQueue::new();
        queue.text(TypeTag::String, vec![0u8; 256]);

        let err = serialize(queue, 512).unwrap_err();
        assert_eq!(err, WireError::LengthOverflow { tag: TypeTag::String, len: 256, max: 255 });
    }

    #[test]
    fn absurd_hint_fails_allocation() {
        let mut queue = WriteQueue::new();
        queue.marker(TypeTag::Nil);

        let err = serialize(queue, usize::MAX).unwrap_err();
        assert!(matches!(err, WireError::AllocationFailed { .. }));
    }

    #[test]
    fn encoded_len_matches_output() {
        let mut queue = WriteQueue::new();
        queue
            .marker(TypeTag::ArrayStart)
            .int(TypeTag::Uint32, 7)
            .float(TypeTag::Double, 0.5)
            .text(TypeTag::HugeString, "abc")
            .marker(TypeTag::RecordEnd);

        let expected = queue.encoded_len();
        let out = serialize(queue, expected).unwrap();
        assert_eq!(out.len(), expected);
    }
}
