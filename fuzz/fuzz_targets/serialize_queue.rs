//! Fuzz target for serialize
//!
//! Builds write queues from arbitrary (tag, value) pairs, including values
//! that do not fit their tag and hints that are too small.
//!
//! # Invariants
//!
//! - Serialize returns an error instead of panicking for every bad entry
//! - Output never exceeds `size_hint + SERIALIZE_SLACK`
//! - Successful output decodes back to the same number of entries

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tidewire_proto::{SERIALIZE_SLACK, TypeTag, WriteQueue, decode_all, serialize};

#[derive(Debug, Arbitrary)]
enum Value {
    Marker,
    Int(i64),
    Float(f64),
    Text(Vec<u8>),
}

#[derive(Debug, Arbitrary)]
struct QueueInput {
    entries: Vec<(u8, Value)>,
    hint: u16,
}

fuzz_target!(|input: QueueInput| {
    let mut queue = WriteQueue::new();
    for (raw, value) in input.entries {
        let Some(tag) = TypeTag::from_u8(raw) else {
            continue;
        };
        match value {
            Value::Marker => queue.marker(tag),
            Value::Int(v) => queue.int(tag, v),
            Value::Float(v) => queue.float(tag, v),
            Value::Text(bytes) => queue.text(tag, bytes),
        };
    }

    let count = queue.len();
    let hint = usize::from(input.hint);
    let Ok(encoded) = serialize(queue, hint) else {
        return;
    };
    assert!(encoded.len() <= hint + SERIALIZE_SLACK);

    let (consumed, decoded) = decode_all(&encoded).unwrap();
    assert_eq!(consumed, encoded.len());
    assert_eq!(decoded.len(), count);
});
