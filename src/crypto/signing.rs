//! Ed25519 signing over a sealed seed element.
//!
//! Oracles sign their published ratchet key lists so clients can audit
//! them against the publication tree.

use ed25519_dalek::{Signature, Signer, SigningKey as DalekSigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroize;

use super::{KeyError, Result};
use crate::memory::{EngineRef, SecretBuffer};

pub const SIGNATURE_SIZE: usize = 64;

/// An Ed25519 keypair whose 32-byte seed lives sealed between uses.
pub struct SigningKey {
    element: SecretBuffer,
    public: [u8; 32],
}

impl SigningKey {
    pub fn generate(engine: EngineRef) -> Result<SigningKey> {
        let element = engine.element(32);
        let mut public = [0u8; 32];
        element.with_bytes(|b| {
            OsRng.fill_bytes(b);
            let mut seed = [0u8; 32];
            seed.copy_from_slice(b);
            public = DalekSigningKey::from_bytes(&seed).verifying_key().to_bytes();
            seed.zeroize();
            Ok::<(), KeyError>(())
        })?;
        Ok(SigningKey { element, public })
    }

    /// Adopt an existing 32-byte seed element.
    pub fn from_element(element: SecretBuffer) -> Result<SigningKey> {
        if element.size() != 32 {
            return Err(KeyError::Size);
        }
        let mut public = [0u8; 32];
        element.with_bytes(|b| {
            let mut seed = [0u8; 32];
            seed.copy_from_slice(b);
            public = DalekSigningKey::from_bytes(&seed).verifying_key().to_bytes();
            seed.zeroize();
            Ok::<(), KeyError>(())
        })?;
        Ok(SigningKey { element, public })
    }

    pub fn public_key(&self) -> &[u8; 32] {
        &self.public
    }

    pub fn private_element(&self) -> &SecretBuffer {
        &self.element
    }

    pub fn sign(&self, message: &[u8]) -> Result<[u8; SIGNATURE_SIZE]> {
        self.element.with_bytes(|b| {
            let mut seed = [0u8; 32];
            seed.copy_from_slice(b);
            let key = DalekSigningKey::from_bytes(&seed);
            seed.zeroize();
            Ok(key.sign(message).to_bytes())
        })
    }

    pub fn destroy(&self) {
        self.element.destroy();
    }
}

/// Verify an Ed25519 signature.
pub fn verify(public: &[u8; 32], message: &[u8], signature: &[u8; SIGNATURE_SIZE]) -> bool {
    let Ok(key) = VerifyingKey::from_bytes(public) else {
        return false;
    };
    key.verify(message, &Signature::from_bytes(signature)).is_ok()
}
