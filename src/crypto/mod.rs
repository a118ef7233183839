//! Cryptographic primitives: the SecretBox-style symmetric layer,
//! randomized padding, the HMAC secret combiner, and the Curve25519 key
//! family (long-term, ephemeral, rotating, ratcheting) plus Ed25519
//! signing. All private scalars live in sealed [`SecretBuffer`]s and are
//! resealed on every exit path.
//!
//! [`SecretBuffer`]: crate::memory::SecretBuffer

pub mod combiner;
pub mod constant_time;
pub mod ephemeral;
pub mod long_term;
pub mod padding;
pub mod ratchet;
pub mod rotating;
pub mod signing;
pub mod symmetric;
pub mod symmetric_key;

pub use combiner::SecretCombiner;
pub use constant_time::{eq_32, eq_slices};
pub use ephemeral::EphemeralKey;
pub use long_term::LongTermKey;
pub use ratchet::{RatchetGenerator, RatchetKey, RATCHET_STATE_SIZE};
pub use rotating::RotatingKey;
pub use signing::{verify, SigningKey};
pub use symmetric_key::SymmetricKey;

use thiserror::Error;

use crate::memory::{Cell, MemoryError};

#[derive(Error, Debug)]
pub enum KeyError {
    #[error("key not found")]
    KeyNotFound,
    #[error("ratchet key not found")]
    RatchetNotFound,
    #[error("wrong element size for operation")]
    Size,
    #[error(transparent)]
    Memory(#[from] MemoryError),
}

pub type Result<T> = std::result::Result<T, KeyError>;

/// A source of Diffie-Hellman shared secrets.
///
/// `my_public`, when given, names which of the source's keys must perform
/// the operation; sources holding several generations (rotating, ratchet)
/// select by it and fail when no valid generation matches. The returned
/// public key is the one actually used — for ephemeral sources a fresh
/// one-shot key. The secret cell holds `SHA-256(X25519(k, peer))`.
pub trait SharedSecretSource {
    fn shared_secret(&self, my_public: Option<&[u8; 32]>, peer_public: &[u8; 32])
        -> Result<([u8; 32], Cell)>;
}

/// Curve25519 base-point multiplication of a raw scalar.
pub(crate) fn scalar_base_mult(scalar: &[u8; 32]) -> [u8; 32] {
    let secret = x25519_dalek::StaticSecret::from(*scalar);
    x25519_dalek::PublicKey::from(&secret).to_bytes()
}

/// X25519 followed by one SHA-256 pass, written into `out`.
pub(crate) fn hashed_shared_secret(scalar: &[u8; 32], peer: &[u8; 32], out: &mut [u8]) {
    use sha2::{Digest, Sha256};
    let secret = x25519_dalek::StaticSecret::from(*scalar);
    let peer_key = x25519_dalek::PublicKey::from(*peer);
    let shared = secret.diffie_hellman(&peer_key);
    let digest = Sha256::digest(shared.as_bytes());
    out[..32].copy_from_slice(&digest);
}
