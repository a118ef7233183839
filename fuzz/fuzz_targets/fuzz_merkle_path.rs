#![no_main]
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sha2::Sha256;

use cypherlock_protocol::merkle::{MerkleTree, Path};

/// Fuzz merkle path decoding and verification.
///
/// - decoded arbitrary paths never panic either verifier, and both
///   verifiers agree
/// - real trees still verify after an encode/decode round-trip

#[derive(Arbitrary, Debug)]
struct PathInput {
    raw: Vec<u8>,
    leaf_content: Vec<u8>,
    leaves: Vec<Vec<u8>>,
}

fuzz_target!(|input: PathInput| {
    if input.raw.len() > 16384 || input.leaves.len() > 64 {
        return;
    }

    if let Some(path) = Path::decode(&input.raw, 32) {
        let a = path.verify_ascent::<Sha256>(&input.leaf_content);
        let b = path.verify_stack::<Sha256>(&input.leaf_content);
        assert_eq!(a, b, "verifiers must agree");
    }

    if !input.leaves.is_empty() && input.leaves.iter().all(|l| l.len() <= 256) {
        let paths = MerkleTree::<Sha256>::new(&input.leaves)
            .expect("non-empty tree")
            .paths();
        for (i, p) in paths.iter().enumerate() {
            let decoded = Path::decode(&p.encode(), 32).expect("own encoding decodes");
            assert!(decoded.verify_ascent::<Sha256>(&input.leaves[i]));
            assert!(decoded.verify_stack::<Sha256>(&input.leaves[i]));
        }
    }
});
