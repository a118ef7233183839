#![no_main]
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use std::sync::Arc;

use cypherlock_protocol::{
    EngineRef, KeyContainer, LongTermKey, SecretCalculator, SecretCombiner, UnprotectedEngine,
};

/// Fuzz the hybrid envelope parser.
///
/// Arbitrary bytes fed to decrypt must produce an error, never a panic
/// and never a bogus plaintext. A mutated real envelope must be rejected.

#[derive(Arbitrary, Debug)]
struct EnvelopeInput {
    raw: Vec<u8>,
    msg: Vec<u8>,
    flip_at: u32,
}

fuzz_target!(|input: EnvelopeInput| {
    if input.raw.len() > 16384 || input.msg.len() > 4096 {
        return;
    }
    let engine: EngineRef = Arc::new(UnprotectedEngine::with_random_key());
    let k1 = LongTermKey::generate(engine.clone()).expect("keygen");
    let k2 = LongTermKey::generate(engine.clone()).expect("keygen");

    let mut receiver = SecretCalculator::new(
        SecretCombiner::new(engine.clone()),
        0,
        vec![KeyContainer::new(&k2)],
    );
    assert!(receiver.decrypt(&input.raw).is_err());

    let mut sender = SecretCalculator::new(
        SecretCombiner::new(engine.clone()),
        77,
        vec![KeyContainer::with_keys(&k1, *k1.public_key(), *k2.public_key())],
    );
    let mut envelope = sender.encrypt(&input.msg).expect("encrypt");
    let flip = input.flip_at as usize % envelope.len();
    envelope[flip] ^= 0x01;

    let mut receiver = SecretCalculator::new(
        SecretCombiner::new(engine),
        0,
        vec![KeyContainer::new(&k2)],
    );
    match receiver.decrypt(&envelope) {
        // Flipping a header byte changes the derived key; flipping the
        // ciphertext fails the tag. Either way the plaintext never
        // survives unnoticed.
        Ok(plain) => assert_ne!(plain, input.msg),
        Err(_) => {}
    }
});
