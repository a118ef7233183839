//! Forward-secure time-release ratchet.
//!
//! The ratchet derives a Curve25519 private key per time slot of
//! `ratchet_time` seconds:
//!
//! ```text
//! base     = HMAC(base, constant)
//! private  = HMAC(base, generator)
//! public   = curve25519_base(private)
//! ```
//!
//! Once advanced, earlier bases are unrecoverable. The state keeps exactly
//! one previous generation so requests straddling a tick still decrypt.
//!
//! The whole state is a fixed 241-byte packed layout inside a sealed
//! element; the raw bytes are the save/restore interface.

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroize;

use super::combiner::hmac_sha256;
use super::{constant_time::eq_32, hashed_shared_secret, scalar_base_mult};
use super::{KeyError, Result, SharedSecretSource};
use crate::clock::Clock;
use crate::memory::{Cell, EngineRef, SecretBuffer};
use crate::protocol::ratchet_keys::RatchetPublicKeyList;

const START_TIME: std::ops::Range<usize> = 0..8;
const RATCHET_TIME: std::ops::Range<usize> = 8..16;
const CONSTANT: std::ops::Range<usize> = 16..48;
const GENERATOR: std::ops::Range<usize> = 48..80;
const BASE: std::ops::Range<usize> = 80..112;
const PRIVATE: std::ops::Range<usize> = 112..144;
const PUBLIC: std::ops::Range<usize> = 144..176;
const PREV_PRIVATE: std::ops::Range<usize> = 176..208;
const PREV_PUBLIC: std::ops::Range<usize> = 208..240;
const HAS_PREVIOUS: usize = 240;

/// Size of the packed ratchet state.
pub const RATCHET_STATE_SIZE: usize = 241;

/// Field view over the packed state bytes.
struct StateView<'a> {
    b: &'a mut [u8],
}

impl<'a> StateView<'a> {
    fn new(b: &'a mut [u8]) -> StateView<'a> {
        debug_assert!(b.len() >= RATCHET_STATE_SIZE);
        StateView { b }
    }

    fn start_time(&self) -> i64 {
        let mut v = [0u8; 8];
        v.copy_from_slice(&self.b[START_TIME]);
        i64::from_be_bytes(v)
    }

    fn set_start_time(&mut self, t: i64) {
        self.b[START_TIME].copy_from_slice(&t.to_be_bytes());
    }

    fn ratchet_time(&self) -> i64 {
        let mut v = [0u8; 8];
        v.copy_from_slice(&self.b[RATCHET_TIME]);
        i64::from_be_bytes(v)
    }

    fn public(&self) -> [u8; 32] {
        let mut v = [0u8; 32];
        v.copy_from_slice(&self.b[PUBLIC]);
        v
    }

    fn prev_public(&self) -> [u8; 32] {
        let mut v = [0u8; 32];
        v.copy_from_slice(&self.b[PREV_PUBLIC]);
        v
    }

    fn has_previous(&self) -> bool {
        self.b[HAS_PREVIOUS] != 0
    }

    fn generate(&mut self, start_time: i64, ratchet_time: i64) {
        self.set_start_time(start_time);
        self.b[RATCHET_TIME].copy_from_slice(&ratchet_time.to_be_bytes());
        OsRng.fill_bytes(&mut self.b[CONSTANT]);
        OsRng.fill_bytes(&mut self.b[GENERATOR]);
        OsRng.fill_bytes(&mut self.b[BASE]);
        self.derive_keypair();
        self.b[PREV_PRIVATE].zeroize();
        self.b[PREV_PUBLIC].zeroize();
        self.b[HAS_PREVIOUS] = 0;
    }

    /// private = HMAC(base, generator); public = base mult.
    fn derive_keypair(&mut self) {
        let mut private = [0u8; 32];
        hmac_sha256(&self.b[BASE], &self.b[GENERATOR], &mut private);
        let public = scalar_base_mult(&private);
        self.b[PRIVATE].copy_from_slice(&private);
        self.b[PUBLIC].copy_from_slice(&public);
        private.zeroize();
    }

    fn needs_advance(&self, now: i64) -> bool {
        self.start_time() + self.ratchet_time() < now
    }

    /// One ratchet tick, when due.
    fn advance_once(&mut self, now: i64) {
        if !self.needs_advance(now) {
            return;
        }
        self.b.copy_within(PRIVATE, PREV_PRIVATE.start);
        self.b.copy_within(PUBLIC, PREV_PUBLIC.start);
        self.b[HAS_PREVIOUS] = 1;
        let mut next_base = [0u8; 32];
        hmac_sha256(&self.b[BASE], &self.b[CONSTANT], &mut next_base);
        self.b[BASE].copy_from_slice(&next_base);
        next_base.zeroize();
        self.derive_keypair();
        let start = self.start_time() + self.ratchet_time();
        self.set_start_time(start);
    }

    /// Seconds until the next tick is due.
    fn wait_seconds(&self, now: i64) -> i64 {
        self.ratchet_time() - (now - self.start_time())
    }

    /// Hashed shared secret from the current or previous private key.
    fn shared_into(&self, use_previous: bool, peer: &[u8; 32], out: &mut [u8]) {
        let range = if use_previous { PREV_PRIVATE } else { PRIVATE };
        let mut scalar = [0u8; 32];
        scalar.copy_from_slice(&self.b[range]);
        hashed_shared_secret(&scalar, peer, out);
        scalar.zeroize();
    }
}

/// A time-release ratchet key over a sealed state element.
pub struct RatchetKey {
    engine: EngineRef,
    element: SecretBuffer,
    clock: Clock,
}

impl RatchetKey {
    /// Generate a fresh ratchet. A `start_time` of zero or below means
    /// "now". The state is advanced to the current slot before returning.
    pub fn generate(
        engine: EngineRef,
        clock: Clock,
        start_time: i64,
        ratchet_time: i64,
    ) -> Result<RatchetKey> {
        let start = if start_time <= 0 { clock.now() } else { start_time };
        let element = engine.element(RATCHET_STATE_SIZE);
        element.with_bytes(|b| {
            StateView::new(b).generate(start, ratchet_time);
            Ok::<(), KeyError>(())
        })?;
        let key = RatchetKey {
            engine,
            element,
            clock,
        };
        key.advance()?;
        Ok(key)
    }

    /// Adopt a previously saved state element.
    pub fn restore(engine: EngineRef, clock: Clock, element: SecretBuffer) -> Result<RatchetKey> {
        if element.size() != RATCHET_STATE_SIZE {
            return Err(KeyError::Size);
        }
        Ok(RatchetKey {
            engine,
            element,
            clock,
        })
    }

    /// Advance the ratchet to the current slot. Returns the seconds until
    /// the next tick. The catch-up loop runs twice in case the first pass
    /// itself took longer than a tick.
    pub fn advance(&self) -> Result<i64> {
        self.element.with_bytes(|b| {
            let mut view = StateView::new(b);
            for _ in 0..2 {
                let now = self.clock.now();
                while view.needs_advance(now) {
                    view.advance_once(now);
                }
            }
            Ok(view.wait_seconds(self.clock.now()))
        })
    }

    /// Clone the state into an independent generator for public-key
    /// precalculation. The live ratchet stays untouched.
    pub fn generator(&self) -> Result<RatchetGenerator> {
        self.advance()?;
        let mut cell = self.engine.cell(RATCHET_STATE_SIZE);
        self.element.with_bytes(|b| {
            cell.load(b);
            Ok::<(), KeyError>(())
        })?;
        Ok(RatchetGenerator { cell })
    }

    /// Current slot public key.
    pub fn public_key(&self) -> Result<[u8; 32]> {
        self.advance()?;
        self.element.with_bytes(|b| Ok(StateView::new(b).public()))
    }

    pub fn private_element(&self) -> &SecretBuffer {
        &self.element
    }

    pub fn into_private_element(self) -> SecretBuffer {
        self.element
    }

    pub fn destroy(&self) {
        self.element.destroy();
    }
}

impl SharedSecretSource for RatchetKey {
    fn shared_secret(
        &self,
        my_public: Option<&[u8; 32]>,
        peer_public: &[u8; 32],
    ) -> Result<([u8; 32], Cell)> {
        self.advance()?;
        let mut secret = self.engine.cell(32);
        let used = self.element.with_bytes(|b| {
            let view = StateView::new(b);
            let claimed = my_public.copied().unwrap_or_else(|| view.public());
            let use_previous = if eq_32(&claimed, &view.public()) {
                false
            } else if view.has_previous() && eq_32(&claimed, &view.prev_public()) {
                true
            } else {
                return Err(KeyError::RatchetNotFound);
            };
            view.shared_into(use_previous, peer_public, secret.bytes_mut());
            Ok(claimed)
        })?;
        Ok((used, secret))
    }
}

/// Single-use generator for future ratchet public keys. Consumed by
/// [`RatchetGenerator::public_keys`]; the cloned state is destroyed on
/// return.
pub struct RatchetGenerator {
    cell: Cell,
}

impl RatchetGenerator {
    /// Walk the cloned state through simulated time, collecting `count`
    /// consecutive public keys with their list parameters.
    pub fn public_keys(mut self, count: usize) -> RatchetPublicKeyList {
        let mut view = StateView::new(self.cell.bytes_mut());
        let start_time = view.start_time();
        let ratchet_time = view.ratchet_time();
        let mut keys = Vec::with_capacity(count);
        let mut now = start_time + ratchet_time + 1;
        for i in 0..count {
            keys.push(view.public());
            if i + 1 == count {
                break;
            }
            view.advance_once(now);
            now += ratchet_time;
        }
        self.cell.destroy();
        RatchetPublicKeyList {
            start_time,
            ratchet_time,
            keys,
        }
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
    fn test_advance_wait_time() {
        let engine = engine();
        let clock = Clock::fixed(251);
        let key = RatchetKey::generate(engine, clock, 1, 100).unwrap();
        // Slots: 1, 101, 201. At t=251 the current slot started at 201.
        assert_eq!(key.advance().unwrap(), 50);
    }

    #[test]
    fn test_time_reachability_via_key_list() {
        let engine = engine();
        let time = Arc::new(AtomicI64::new(251));
        let t = time.clone();
        let clock = Clock::from_fn(move || t.load(Ordering::SeqCst));

        let my_key = LongTermKey::generate(engine.clone()).unwrap();
        let ratchet = RatchetKey::generate(engine, clock, 1, 100).unwrap();
        let keys = ratchet.generator().unwrap().public_keys(10);

        let current = keys.select_key(251).unwrap();
        let (_, s1) = ratchet
            .shared_secret(Some(&current.public_key), my_key.public_key())
            .unwrap();
        let (_, s2) = my_key.shared_secret(None, &current.public_key).unwrap();
        assert_eq!(s1.bytes(), s2.bytes());

        time.store(600, Ordering::SeqCst);
        let later = keys.select_key(600).unwrap();
        assert_ne!(later.public_key, current.public_key);
        let (_, s3) = ratchet
            .shared_secret(Some(&later.public_key), my_key.public_key())
            .unwrap();
        let (_, s4) = my_key.shared_secret(None, &later.public_key).unwrap();
        assert_eq!(s3.bytes(), s4.bytes());
    }

    #[test]
    fn test_previous_slot_remains_usable() {
        let engine = engine();
        let time = Arc::new(AtomicI64::new(50));
        let t = time.clone();
        let clock = Clock::from_fn(move || t.load(Ordering::SeqCst));

        let my_key = LongTermKey::generate(engine.clone()).unwrap();
        let ratchet = RatchetKey::generate(engine, clock, 1, 100).unwrap();
        let keys = ratchet.generator().unwrap().public_keys(4);
        let slot0 = keys.select_key(50).unwrap();

        // One tick later the old slot key must still unwrap.
        time.store(150, Ordering::SeqCst);
        let (_, s) = ratchet
            .shared_secret(Some(&slot0.public_key), my_key.public_key())
            .unwrap();
        let (_, s2) = my_key.shared_secret(None, &slot0.public_key).unwrap();
        assert_eq!(s.bytes(), s2.bytes());

        // Two ticks later it is gone for good.
        time.store(250, Ordering::SeqCst);
        assert!(matches!(
            ratchet.shared_secret(Some(&slot0.public_key), my_key.public_key()),
            Err(KeyError::RatchetNotFound)
        ));
    }

    #[test]
    fn test_generator_list_matches_live_ratchet() {
        let engine = engine();
        let time = Arc::new(AtomicI64::new(1000));
        let t = time.clone();
        let clock = Clock::from_fn(move || t.load(Ordering::SeqCst));

        let ratchet = RatchetKey::generate(engine, clock, 0, 60).unwrap();
        let keys = ratchet.generator().unwrap().public_keys(5);
        assert_eq!(keys.keys.len(), 5);
        assert_eq!(keys.ratchet_time, 60);
        // The first listed key is the live current key.
        assert_eq!(keys.keys[0], ratchet.public_key().unwrap());
        // All listed keys are distinct.
        for i in 0..keys.keys.len() {
            for j in i + 1..keys.keys.len() {
                assert_ne!(keys.keys[i], keys.keys[j]);
            }
        }
    }

    #[test]
    fn test_save_restore_roundtrip() {
        let engine = engine();
        let clock = Clock::fixed(500);
        let ratchet = RatchetKey::generate(engine.clone(), clock.clone(), 1, 100).unwrap();
        let public = ratchet.public_key().unwrap();
        let element = ratchet.into_private_element();
        let restored = RatchetKey::restore(engine, clock, element).unwrap();
        assert_eq!(restored.public_key().unwrap(), public);
    }
}
