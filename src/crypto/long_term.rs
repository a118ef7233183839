//! Long-term Curve25519 identity key over a sealed element.

use rand::rngs::OsRng;
use rand_core::{CryptoRng, RngCore};
use zeroize::Zeroize;

use super::{constant_time::eq_32, hashed_shared_secret, scalar_base_mult};
use super::{KeyError, Result, SharedSecretSource};
use crate::memory::{Cell, EngineRef, SecretBuffer};

/// A Curve25519 keypair whose private scalar lives sealed between uses.
pub struct LongTermKey {
    engine: EngineRef,
    element: SecretBuffer,
    public: [u8; 32],
}

impl LongTermKey {
    /// Generate a fresh key from the system RNG.
    pub fn generate(engine: EngineRef) -> Result<LongTermKey> {
        LongTermKey::generate_from_rng(engine, &mut OsRng)
    }

    /// Generate a fresh key from a caller-supplied RNG.
    pub fn generate_from_rng<R: RngCore + CryptoRng>(
        engine: EngineRef,
        rng: &mut R,
    ) -> Result<LongTermKey> {
        let element = engine.element(32);
        let mut public = [0u8; 32];
        element.with_bytes(|b| {
            rng.fill_bytes(b);
            let mut scalar = [0u8; 32];
            scalar.copy_from_slice(b);
            public = scalar_base_mult(&scalar);
            scalar.zeroize();
            Ok::<(), KeyError>(())
        })?;
        Ok(LongTermKey {
            engine,
            element,
            public,
        })
    }

    /// Adopt an existing 32-byte private element, deriving its public key.
    pub fn from_element(engine: EngineRef, element: SecretBuffer) -> Result<LongTermKey> {
        if element.size() != 32 {
            return Err(KeyError::Size);
        }
        let mut public = [0u8; 32];
        element.with_bytes(|b| {
            let mut scalar = [0u8; 32];
            scalar.copy_from_slice(b);
            public = scalar_base_mult(&scalar);
            scalar.zeroize();
            Ok::<(), KeyError>(())
        })?;
        Ok(LongTermKey {
            engine,
            element,
            public,
        })
    }

    pub fn public_key(&self) -> &[u8; 32] {
        &self.public
    }

    /// The sealed private element, e.g. for engine encryption at rest.
    pub fn private_element(&self) -> &SecretBuffer {
        &self.element
    }

    /// Give up ownership of the private element.
    pub fn into_private_element(self) -> SecretBuffer {
        self.element
    }

    pub fn destroy(&self) {
        self.element.destroy();
    }
}

impl SharedSecretSource for LongTermKey {
    fn shared_secret(
        &self,
        my_public: Option<&[u8; 32]>,
        peer_public: &[u8; 32],
    ) -> Result<([u8; 32], Cell)> {
        if let Some(claimed) = my_public {
            if !eq_32(claimed, &self.public) {
                return Err(KeyError::KeyNotFound);
            }
        }
        let mut secret = self.engine.cell(32);
        self.element.with_bytes(|b| {
            let mut scalar = [0u8; 32];
            scalar.copy_from_slice(b);
            hashed_shared_secret(&scalar, peer_public, secret.bytes_mut());
            scalar.zeroize();
            Ok::<(), KeyError>(())
        })?;
        Ok((self.public, secret))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::UnprotectedEngine;
    use std::sync::Arc;

    fn engine() -> EngineRef {
        Arc::new(UnprotectedEngine::with_random_key())
    }

    #[test]
    fn test_shared_secret_agreement() {
        let engine = engine();
        let k1 = LongTermKey::generate(engine.clone()).unwrap();
        let k2 = LongTermKey::generate(engine.clone()).unwrap();
        let (p1, s1) = k1.shared_secret(None, k2.public_key()).unwrap();
        let (p2, s2) = k2.shared_secret(None, k1.public_key()).unwrap();
        assert_eq!(&p1, k1.public_key());
        assert_eq!(&p2, k2.public_key());
        assert_eq!(s1.bytes(), s2.bytes());
    }

    #[test]
    fn test_wrong_claimed_public_rejected() {
        let engine = engine();
        let k1 = LongTermKey::generate(engine.clone()).unwrap();
        let k2 = LongTermKey::generate(engine).unwrap();
        let err = k1.shared_secret(Some(k2.public_key()), k2.public_key());
        assert!(matches!(err, Err(KeyError::KeyNotFound)));
    }

    #[test]
    fn test_element_restore_same_public() {
        let engine = engine();
        let k1 = LongTermKey::generate(engine.clone()).unwrap();
        let public = *k1.public_key();
        let restored = LongTermKey::from_element(engine, k1.into_private_element()).unwrap();
        assert_eq!(restored.public_key(), &public);
    }
}
