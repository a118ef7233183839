//! The oracle message: the decrypted inner payload an oracle acts on.
//!
//! Layering, outside in: the at-rest container key protects the container;
//! the container carries this message encrypted to the oracle's long-term
//! key (the inner envelope); the share field inside is an encrypted
//! [`ShareMsg`](super::ShareMsg), optionally wrapped once more to a
//! timelock ratchet key so it only opens inside the chosen validity
//! window.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::wire::{Reader, Writer};
use super::{ProtocolError, Result, INNER_ENVELOPE_TYPE, ORACLE_MSG_TYPE_ID};
use crate::crypto::combiner::hmac_sha256;
use crate::crypto::constant_time::eq_32;
use crate::crypto::{EphemeralKey, LongTermKey, RatchetKey, SecretCombiner};
use crate::hybrid::{KeyContainer, SecretCalculator};
use crate::memory::EngineRef;

const ZERO_KEY: [u8; 32] = [0u8; 32];

/// The inner payload handed to an oracle. Semaphore slots holding all
/// zeros are unused; an all-zero timelock key disables the timelock layer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct OracleMessage {
    /// URL where the oracle listens. Not part of the encrypted encoding;
    /// it travels in the container only.
    pub oracle_url: Vec<u8>,
    pub long_term_oracle_public_key: [u8; 32],
    pub timelock_public_key: [u8; 32],
    /// Semaphores that must be unset for the oracle to answer.
    pub test_semaphores: [[u8; 32]; 3],
    /// Semaphores the oracle records unconditionally.
    pub set_semaphores: [[u8; 32]; 3],
    pub valid_from: i64,
    pub valid_to: i64,
    pub response_public_key: [u8; 32],
    pub share: Vec<u8>,
    /// Reconstruction threshold. Container-only, like the URL.
    pub share_threshold: i32,
}

/// Canonical semaphore name: `HMAC(long_term_oracle_pub, raw_name)`.
pub fn generate_semaphore(long_term_oracle_public_key: &[u8; 32], name: &[u8; 32]) -> [u8; 32] {
    let mut out = [0u8; 32];
    hmac_sha256(long_term_oracle_public_key, name, &mut out);
    out
}

impl OracleMessage {
    /// Tagged binary encoding of the encrypted-envelope fields.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut w = Writer::new(ORACLE_MSG_TYPE_ID);
        w.put_array32(&self.response_public_key);
        w.put_array32(&self.long_term_oracle_public_key);
        w.put_array32(&self.timelock_public_key);
        for s in &self.test_semaphores {
            w.put_array32(s);
        }
        for s in &self.set_semaphores {
            w.put_array32(s);
        }
        w.put_i64(self.valid_from);
        w.put_i64(self.valid_to);
        w.put_bytes(&self.share)?;
        Ok(w.finish())
    }

    pub fn decode(d: &[u8]) -> Result<OracleMessage> {
        let mut r = Reader::new(d, ORACLE_MSG_TYPE_ID)?;
        let response_public_key = r.array32()?;
        let long_term_oracle_public_key = r.array32()?;
        let timelock_public_key = r.array32()?;
        let mut test_semaphores = [[0u8; 32]; 3];
        for s in test_semaphores.iter_mut() {
            *s = r.array32()?;
        }
        let mut set_semaphores = [[0u8; 32]; 3];
        for s in set_semaphores.iter_mut() {
            *s = r.array32()?;
        }
        let valid_from = r.i64()?;
        let valid_to = r.i64()?;
        let share = r.bytes()?.to_vec();
        r.finish()?;
        Ok(OracleMessage {
            oracle_url: Vec::new(),
            long_term_oracle_public_key,
            timelock_public_key,
            test_semaphores,
            set_semaphores,
            valid_from,
            valid_to,
            response_public_key,
            share,
            share_threshold: 0,
        })
    }

    /// Replace raw semaphore names with their canonical form. All-zero
    /// slots stay all-zero.
    pub fn canonicalize_semaphores(&mut self) {
        let ltk = self.long_term_oracle_public_key;
        for s in self
            .test_semaphores
            .iter_mut()
            .chain(self.set_semaphores.iter_mut())
        {
            if !eq_32(s, &ZERO_KEY) {
                *s = generate_semaphore(&ltk, s);
            }
        }
    }

    /// The fixed nonce binding the timelock layer to the policy fields.
    pub fn deterministic_nonce(&self) -> [u8; 32] {
        let mut h = Sha256::new();
        h.update(self.valid_from.to_be_bytes());
        h.update(self.valid_to.to_be_bytes());
        h.update(self.long_term_oracle_public_key);
        h.update(self.timelock_public_key);
        for s in &self.test_semaphores {
            h.update(s);
        }
        for s in &self.set_semaphores {
            h.update(s);
        }
        h.finalize().into()
    }

    /// Wrap the (already share-message-encrypted) share to the timelock
    /// key. A no-op when the timelock key is unset.
    pub(crate) fn encrypt_share(&mut self, engine: &EngineRef) -> Result<()> {
        if eq_32(&self.timelock_public_key, &ZERO_KEY) {
            return Ok(());
        }
        let ephemeral = EphemeralKey::new(engine.clone());
        let mut tsc = SecretCalculator::new(
            SecretCombiner::new(engine.clone()),
            INNER_ENVELOPE_TYPE,
            vec![
                KeyContainer::to_peer(&ephemeral, self.timelock_public_key),
                KeyContainer::to_peer(&ephemeral, self.long_term_oracle_public_key),
            ],
        )
        .with_deterministic_nonce(self.deterministic_nonce());
        self.share = tsc.encrypt(&self.share)?;
        Ok(())
    }

    /// Unwrap the timelock layer with the oracle's ratchet. A no-op when
    /// the timelock key is unset.
    pub(crate) fn decrypt_share(
        &mut self,
        long_term: &LongTermKey,
        timelock: &RatchetKey,
        engine: &EngineRef,
    ) -> Result<()> {
        if eq_32(&self.timelock_public_key, &ZERO_KEY) {
            return Ok(());
        }
        let mut tsc = SecretCalculator::new(
            SecretCombiner::new(engine.clone()),
            INNER_ENVELOPE_TYPE,
            vec![KeyContainer::new(timelock), KeyContainer::new(long_term)],
        )
        .with_deterministic_nonce(self.deterministic_nonce());
        self.share = tsc.decrypt(&self.share)?;
        Ok(())
    }

    /// Build the inner envelope: two DHs to the oracle's long-term key,
    /// one from a fresh ephemeral, one from the response key.
    pub(crate) fn encrypt_inner(
        &self,
        response_key: &LongTermKey,
        engine: &EngineRef,
    ) -> Result<Vec<u8>> {
        let ephemeral = EphemeralKey::new(engine.clone());
        let mut tsc = SecretCalculator::new(
            SecretCombiner::new(engine.clone()),
            INNER_ENVELOPE_TYPE,
            vec![
                KeyContainer::to_peer(&ephemeral, self.long_term_oracle_public_key),
                KeyContainer::with_keys(
                    response_key,
                    *response_key.public_key(),
                    self.long_term_oracle_public_key,
                ),
            ],
        );
        let encoded = Zeroizing::new(self.encode()?);
        Ok(tsc.encrypt(&encoded)?)
    }

    /// Open the inner envelope. The oracle's long-term key serves both DH
    /// positions. Verifies that the embedded response key matches the
    /// envelope's second sender key.
    pub fn decrypt_inner(
        long_term: &LongTermKey,
        engine: &EngineRef,
        msg: &[u8],
    ) -> Result<OracleMessage> {
        let mut tsc = SecretCalculator::new(
            SecretCombiner::new(engine.clone()),
            INNER_ENVELOPE_TYPE,
            vec![KeyContainer::new(long_term), KeyContainer::new(long_term)],
        );
        let plain = Zeroizing::new(tsc.decrypt(msg)?);
        let decoded = OracleMessage::decode(&plain)?;
        let response_sender = tsc.keys[1]
            .peer_public
            .expect("peer keys set by header parse");
        if !eq_32(&decoded.response_public_key, &response_sender) {
            return Err(ProtocolError::WrongResponseKey);
        }
        Ok(decoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::UnprotectedEngine;
    use std::sync::Arc;

    fn sample() -> OracleMessage {
        OracleMessage {
            oracle_url: b"http://oracle.example".to_vec(),
            long_term_oracle_public_key: [1; 32],
            timelock_public_key: [2; 32],
            test_semaphores: [[3; 32], [0; 32], [4; 32]],
            set_semaphores: [[5; 32], [6; 32], [0; 32]],
            valid_from: 100,
            valid_to: 200,
            response_public_key: [7; 32],
            share: b"share bytes".to_vec(),
            share_threshold: 2,
        }
    }

    #[test]
    fn test_codec_roundtrip() {
        let m = sample();
        let d = m.encode().unwrap();
        let back = OracleMessage::decode(&d).unwrap();
        // URL and threshold travel in the container, not the envelope.
        assert!(back.oracle_url.is_empty());
        assert_eq!(back.share_threshold, 0);
        assert_eq!(back.long_term_oracle_public_key, m.long_term_oracle_public_key);
        assert_eq!(back.test_semaphores, m.test_semaphores);
        assert_eq!(back.set_semaphores, m.set_semaphores);
        assert_eq!(back.valid_from, m.valid_from);
        assert_eq!(back.valid_to, m.valid_to);
        assert_eq!(back.response_public_key, m.response_public_key);
        assert_eq!(back.share, m.share);
    }

    #[test]
    fn test_canonicalize_skips_unused_slots() {
        let mut m = sample();
        m.canonicalize_semaphores();
        assert_eq!(m.test_semaphores[1], [0u8; 32]);
        assert_eq!(m.set_semaphores[2], [0u8; 32]);
        assert_ne!(m.test_semaphores[0], [3u8; 32]);
        assert_eq!(
            m.test_semaphores[0],
            generate_semaphore(&[1; 32], &[3; 32])
        );
        // Canonicalization is deterministic per oracle key.
        assert_ne!(
            generate_semaphore(&[1; 32], &[3; 32]),
            generate_semaphore(&[9; 32], &[3; 32])
        );
    }

    #[test]
    fn test_deterministic_nonce_binds_policy_fields() {
        let m = sample();
        let dn = m.deterministic_nonce();
        let mut m2 = m.clone();
        m2.valid_to += 1;
        assert_ne!(dn, m2.deterministic_nonce());
        let mut m3 = m.clone();
        m3.test_semaphores[1] = [0xFF; 32];
        assert_ne!(dn, m3.deterministic_nonce());
        assert_eq!(dn, m.clone().deterministic_nonce());
    }

    #[test]
    fn test_inner_envelope_roundtrip() {
        let engine: EngineRef = Arc::new(UnprotectedEngine::with_random_key());
        let oracle_key = LongTermKey::generate(engine.clone()).unwrap();
        let response_key = LongTermKey::generate(engine.clone()).unwrap();

        let mut m = sample();
        m.long_term_oracle_public_key = *oracle_key.public_key();
        m.timelock_public_key = [0; 32];
        m.response_public_key = *response_key.public_key();

        let envelope = m.encrypt_inner(&response_key, &engine).unwrap();
        let back = OracleMessage::decrypt_inner(&oracle_key, &engine, &envelope).unwrap();
        assert_eq!(back.share, m.share);
        assert_eq!(back.response_public_key, m.response_public_key);
    }

    #[test]
    fn test_inner_envelope_rejects_foreign_response_key() {
        let engine: EngineRef = Arc::new(UnprotectedEngine::with_random_key());
        let oracle_key = LongTermKey::generate(engine.clone()).unwrap();
        let response_key = LongTermKey::generate(engine.clone()).unwrap();
        let other_key = LongTermKey::generate(engine.clone()).unwrap();

        let mut m = sample();
        m.long_term_oracle_public_key = *oracle_key.public_key();
        // Claims a response key other than the envelope sender.
        m.response_public_key = *other_key.public_key();

        let envelope = m.encrypt_inner(&response_key, &engine).unwrap();
        assert!(matches!(
            OracleMessage::decrypt_inner(&oracle_key, &engine, &envelope),
            Err(ProtocolError::WrongResponseKey)
        ));
    }

    #[test]
    fn test_timelock_share_roundtrip() {
        let engine: EngineRef = Arc::new(UnprotectedEngine::with_random_key());
        let clock = crate::clock::Clock::fixed(1000);
        let oracle_key = LongTermKey::generate(engine.clone()).unwrap();
        let ratchet =
            RatchetKey::generate(engine.clone(), clock, 0, 3600).unwrap();
        let keys = ratchet.generator().unwrap().public_keys(4);
        let timelock = keys.select_key(1000).unwrap();

        let mut m = sample();
        m.long_term_oracle_public_key = *oracle_key.public_key();
        m.timelock_public_key = timelock.public_key;
        m.valid_from = timelock.valid_from;
        m.valid_to = timelock.valid_to;
        m.canonicalize_semaphores();
        let original_share = m.share.clone();

        m.encrypt_share(&engine).unwrap();
        assert_ne!(m.share, original_share);
        m.decrypt_share(&oracle_key, &ratchet, &engine).unwrap();
        assert_eq!(m.share, original_share);
    }

    #[test]
    fn test_timelock_share_bound_to_policy() {
        let engine: EngineRef = Arc::new(UnprotectedEngine::with_random_key());
        let clock = crate::clock::Clock::fixed(1000);
        let oracle_key = LongTermKey::generate(engine.clone()).unwrap();
        let ratchet =
            RatchetKey::generate(engine.clone(), clock, 0, 3600).unwrap();
        let keys = ratchet.generator().unwrap().public_keys(4);
        let timelock = keys.select_key(1000).unwrap();

        let mut m = sample();
        m.long_term_oracle_public_key = *oracle_key.public_key();
        m.timelock_public_key = timelock.public_key;
        m.valid_from = timelock.valid_from;
        m.valid_to = timelock.valid_to;
        m.encrypt_share(&engine).unwrap();

        // Tampering with a policy field changes the deterministic nonce
        // and the unwrap must fail.
        m.valid_to += 1;
        assert!(m.decrypt_share(&oracle_key, &ratchet, &engine).is_err());
    }
}
