//! Fuzz target for decode_entry / decode_all
//!
//! Arbitrary bytes straight off the socket. Decoding must never panic, and
//! whatever decodes must re-encode to the same length and entry count.
//! Bytes are not compared: widening a signalling NaN quiets it.

#![no_main]

use libfuzzer_sys::fuzz_target;
use tidewire_proto::{WriteQueue, decode_all, serialize};

fuzz_target!(|data: &[u8]| {
    let Ok((consumed, entries)) = decode_all(data) else {
        return;
    };
    assert!(consumed <= data.len());

    if entries.is_empty() {
        assert_eq!(consumed, 0);
        return;
    }

    let count = entries.len();
    let queue: WriteQueue = entries.into_iter().collect();
    let hint = queue.encoded_len();
    assert_eq!(hint, consumed);

    let encoded = serialize(queue, hint).unwrap();
    assert_eq!(encoded.len(), consumed);
    let (reconsumed, redecoded) = decode_all(&encoded).unwrap();
    assert_eq!(reconsumed, consumed);
    assert_eq!(redecoded.len(), count);
});
