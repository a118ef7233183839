//! Rotating short-term Curve25519 key.
//!
//! Three private scalars sit contiguously in one 96-byte sealed element,
//! laid out new, current, previous. Rotation shifts new → current →
//! previous and refills new from entropy. The current key always computes
//! shared secrets; the previous key only while the expiry window is open.

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroize;

use super::{constant_time::eq_32, hashed_shared_secret, scalar_base_mult};
use super::{KeyError, Result, SharedSecretSource};
use crate::clock::Clock;
use crate::memory::{Cell, EngineRef, SecretBuffer};

const NEW: std::ops::Range<usize> = 0..32;
const CURRENT: std::ops::Range<usize> = 32..64;
const PREVIOUS: std::ops::Range<usize> = 64..96;

pub struct RotatingKey {
    engine: EngineRef,
    element: SecretBuffer,
    ttl: i64,
    expire_time: i64,
    current_public: [u8; 32],
    previous_public: Option<[u8; 32]>,
    clock: Clock,
}

impl RotatingKey {
    /// A fresh rotating key. The previous generation expires `ttl` seconds
    /// after each rotation.
    pub fn new(ttl: i64, engine: EngineRef, clock: Clock) -> Result<RotatingKey> {
        let element = engine.element(96);
        let mut key = RotatingKey {
            engine,
            element,
            ttl,
            expire_time: 0,
            current_public: [0u8; 32],
            previous_public: None,
            clock,
        };
        key.rotate()?;
        key.previous_public = None;
        Ok(key)
    }

    /// Advance one generation. Returns the new current public key.
    pub fn rotate(&mut self) -> Result<[u8; 32]> {
        self.expire_time = self.clock.now() + self.ttl;
        let old_public = self.current_public;
        let mut new_public = [0u8; 32];
        self.element.with_bytes(|b| {
            OsRng.fill_bytes(&mut b[NEW]);
            b.copy_within(CURRENT, PREVIOUS.start);
            b.copy_within(NEW, CURRENT.start);
            let mut scalar = [0u8; 32];
            scalar.copy_from_slice(&b[CURRENT]);
            new_public = scalar_base_mult(&scalar);
            scalar.zeroize();
            Ok::<(), KeyError>(())
        })?;
        self.previous_public = Some(old_public);
        self.current_public = new_public;
        Ok(new_public)
    }

    pub fn public_key(&self) -> &[u8; 32] {
        &self.current_public
    }

    pub fn destroy(&self) {
        self.element.destroy();
    }
}

impl SharedSecretSource for RotatingKey {
    fn shared_secret(
        &self,
        my_public: Option<&[u8; 32]>,
        peer_public: &[u8; 32],
    ) -> Result<([u8; 32], Cell)> {
        let claimed = my_public.copied().unwrap_or(self.current_public);
        let range = if eq_32(&claimed, &self.current_public) {
            CURRENT
        } else {
            let previous_valid = self
                .previous_public
                .map(|p| self.clock.now() <= self.expire_time && eq_32(&claimed, &p))
                .unwrap_or(false);
            if !previous_valid {
                return Err(KeyError::KeyNotFound);
            }
            PREVIOUS
        };
        let mut secret = self.engine.cell(32);
        self.element.with_bytes(|b| {
            let mut scalar = [0u8; 32];
            scalar.copy_from_slice(&b[range]);
            hashed_shared_secret(&scalar, peer_public, secret.bytes_mut());
            scalar.zeroize();
            Ok::<(), KeyError>(())
        })?;
        Ok((claimed, secret))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::LongTermKey;
    use crate::memory::UnprotectedEngine;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    fn engine() -> EngineRef {
        Arc::new(UnprotectedEngine::with_random_key())
    }

    #[test]
    fn test_rotation_window() {
        let engine = engine();
        let time = Arc::new(AtomicI64::new(10));
        let t = time.clone();
        let clock = Clock::from_fn(move || t.load(Ordering::SeqCst));

        let peer = LongTermKey::generate(engine.clone()).unwrap();
        let mut rot = RotatingKey::new(10, engine, clock).unwrap();

        let prev_pub = *rot.public_key();
        let (_, secret) = rot.shared_secret(Some(&prev_pub), peer.public_key()).unwrap();
        let (_, secret_peer) = peer.shared_secret(None, &prev_pub).unwrap();
        assert_eq!(secret.bytes(), secret_peer.bytes());

        // Rotate at t=15; previous stays valid until t=25.
        time.store(15, Ordering::SeqCst);
        let new_pub = rot.rotate().unwrap();
        assert_ne!(prev_pub, new_pub);

        time.store(20, Ordering::SeqCst);
        let (_, secret_prev) = rot.shared_secret(Some(&prev_pub), peer.public_key()).unwrap();
        assert_eq!(secret_prev.bytes(), secret.bytes());

        // Previous expired at t=26.
        time.store(26, Ordering::SeqCst);
        assert!(matches!(
            rot.shared_secret(Some(&prev_pub), peer.public_key()),
            Err(KeyError::KeyNotFound)
        ));

        // Current key still works, and differs from the previous secret.
        let (_, secret_new) = rot.shared_secret(Some(&new_pub), peer.public_key()).unwrap();
        let (_, secret_new_peer) = peer.shared_secret(None, &new_pub).unwrap();
        assert_eq!(secret_new.bytes(), secret_new_peer.bytes());
        assert_ne!(secret_new.bytes(), secret.bytes());
    }

    #[test]
    fn test_unknown_public_rejected_before_first_rotation() {
        let engine = engine();
        let peer = LongTermKey::generate(engine.clone()).unwrap();
        let rot = RotatingKey::new(10, engine, Clock::fixed(0)).unwrap();
        let bogus = [0x55u8; 32];
        assert!(matches!(
            rot.shared_secret(Some(&bogus), peer.public_key()),
            Err(KeyError::KeyNotFound)
        ));
    }
}
