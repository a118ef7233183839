#![no_main]
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use cypherlock_protocol::crypto::padding::{add_padding, padded_size, remove_padding};

/// Fuzz the padding codec.
///
/// - add/remove round-trip and the size law
/// - remove_padding on arbitrary bytes must never panic
/// - caller-supplied and zero pad keys

#[derive(Arbitrary, Debug)]
struct PaddingInput {
    msg: Vec<u8>,
    pad_length: u16,
    pad_key: Option<[u8; 32]>,
    raw: Vec<u8>,
}

fuzz_target!(|input: PaddingInput| {
    if input.msg.len() > 65536 {
        return;
    }
    let pad_length = input.pad_length as usize;

    let mut key = input.pad_key;
    let padded = add_padding(&input.msg, pad_length, key.as_mut()).expect("padding never fails");
    assert_eq!(padded.len(), padded_size(input.msg.len(), pad_length));
    let stripped = remove_padding(&padded).expect("own padding strips");
    assert_eq!(stripped, input.msg.as_slice());

    // Arbitrary input must strip or error, never panic.
    let _ = remove_padding(&input.raw);
});
