//! Single-use Curve25519 sender keys.
//!
//! Each shared-secret call draws a fresh scalar, derives its one-shot
//! public key and the hashed DH output, and destroys the scalar before
//! returning. Nothing persists between calls.

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroize;

use super::{hashed_shared_secret, scalar_base_mult};
use super::{Result, SharedSecretSource};
use crate::memory::{Cell, EngineRef};

/// Factory for one-shot DH sender keys.
pub struct EphemeralKey {
    engine: EngineRef,
}

impl EphemeralKey {
    pub fn new(engine: EngineRef) -> EphemeralKey {
        EphemeralKey { engine }
    }
}

impl SharedSecretSource for EphemeralKey {
    fn shared_secret(
        &self,
        _my_public: Option<&[u8; 32]>,
        peer_public: &[u8; 32],
    ) -> Result<([u8; 32], Cell)> {
        let mut scratch = self.engine.cell(32);
        OsRng.fill_bytes(scratch.bytes_mut());
        let mut scalar = [0u8; 32];
        scalar.copy_from_slice(scratch.bytes());
        let public = scalar_base_mult(&scalar);
        let mut secret = self.engine.cell(32);
        hashed_shared_secret(&scalar, peer_public, secret.bytes_mut());
        scalar.zeroize();
        scratch.destroy();
        Ok((public, secret))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::LongTermKey;
    use crate::memory::UnprotectedEngine;
    use std::sync::Arc;

    #[test]
    fn test_ephemeral_agreement_and_uniqueness() {
        let engine: EngineRef = Arc::new(UnprotectedEngine::with_random_key());
        let receiver = LongTermKey::generate(engine.clone()).unwrap();
        let eph = EphemeralKey::new(engine);

        let (pub1, s1) = eph.shared_secret(None, receiver.public_key()).unwrap();
        let (s1_pub, s1_recv) = receiver.shared_secret(None, &pub1).unwrap();
        assert_eq!(&s1_pub, receiver.public_key());
        assert_eq!(s1.bytes(), s1_recv.bytes());

        // Each call must use a fresh scalar.
        let (pub2, s2) = eph.shared_secret(None, receiver.public_key()).unwrap();
        assert_ne!(pub1, pub2);
        assert_ne!(s1.bytes(), s2.bytes());
    }
}
