//! Fuzz target for read_number / read_string
//!
//! Arbitrary marker, offset and buffer. The readers must never panic or read
//! past the buffer, whatever the caller passes.
//!
//! # Invariants
//!
//! - A successful read never reports more bytes than remain after `offset`
//! - The "not yet" sentinel `(0, ZERO)` only appears for a truncated payload
//! - Strings are never longer than requested or than the buffer tail

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tidewire_proto::{Number, TypeTag, read_number, read_string};

#[derive(Debug, Arbitrary)]
struct ReadInput {
    marker: u8,
    offset: u16,
    desired: u32,
    buffer: Vec<u8>,
}

fuzz_target!(|input: ReadInput| {
    let offset = usize::from(input.offset);
    let remaining = input.buffer.len().saturating_sub(offset);

    if let Ok((consumed, value)) = read_number(input.marker, &input.buffer, offset) {
        assert!(consumed <= remaining);
        if consumed == 0 {
            assert_eq!(value, Number::ZERO);
            let width = TypeTag::from_u8(input.marker).map_or(0, TypeTag::width);
            assert!(remaining < width);
        }
    }

    let desired = input.desired as usize;
    if let Ok((consumed, text)) = read_string(desired, &input.buffer, offset) {
        assert_eq!(consumed, text.len());
        assert!(text.len() <= desired);
        assert!(text.len() <= remaining);
    }
});
