//! Hybrid KEM layer: folds an ordered sequence of Curve25519 DH exchanges
//! into one symmetric message key and wraps the payload in the envelope
//! wire format.
//!
//! Derivation, for DH outputs `DH₀ … DHₙ`:
//!
//! ```text
//! state₀    = HMAC(protocol_constant, DH₀)
//! stateᵢ    = HMAC(stateᵢ₋₁, DHᵢ)
//! nonceHash = SHA256(type_be16 ‖ nonce ‖ Σ(sender_pubᵢ ‖ receiver_pubᵢ) ‖ dn?)
//! secret    = HMAC(state_last, nonceHash)
//! ```
//!
//! Envelope layout:
//!
//! ```text
//! [0..2]   message type (big-endian u16)
//! [2..34]  32-byte protocol nonce
//! [34..]   per key: sender_pub (32) ‖ receiver_pub (32)
//! [..]     secretbox ciphertext (independent internal 24-byte nonce)
//! ```
//!
//! Public keys travel in sender/receiver wire order; a receiver reads the
//! pairs swapped relative to its own role.

use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::crypto::symmetric::{self, SymmetricError, ENCRYPTION_OVERHEAD};
use crate::crypto::{KeyError, SecretCombiner, SharedSecretSource};
use crate::memory::Cell;

/// Domain separation constant mixed into every derivation chain.
pub const PROTOCOL_CONSTANT: &[u8] = b"Cypherlock Prototype Fund Edition 2019";

/// Size of the 32-byte protocol nonce on the wire.
pub const NONCE_SIZE: usize = 32;

#[derive(Error, Debug)]
pub enum HybridError {
    #[error("headers too short")]
    HeaderSize,
    #[error("input too short to be plausible")]
    Size,
    #[error("unexpected message type")]
    MessageType,
    #[error("could not decrypt")]
    Decrypt,
    #[error(transparent)]
    Key(#[from] KeyError),
}

impl From<SymmetricError> for HybridError {
    fn from(e: SymmetricError) -> HybridError {
        match e {
            SymmetricError::Size => HybridError::Size,
            SymmetricError::Decrypt => HybridError::Decrypt,
        }
    }
}

pub type Result<T> = std::result::Result<T, HybridError>;

/// One DH position in the derivation sequence.
///
/// `my_public` names which local key generation must serve the position
/// (filled in from the wire on receive); `peer_public` is the remote key.
/// After calculation `my_public` holds the key actually used, so ephemeral
/// one-shot keys surface here for header emission.
pub struct KeyContainer<'a> {
    pub source: &'a dyn SharedSecretSource,
    pub my_public: Option<[u8; 32]>,
    pub peer_public: Option<[u8; 32]>,
}

impl<'a> KeyContainer<'a> {
    /// A receive-side container; both publics come from the wire.
    pub fn new(source: &'a dyn SharedSecretSource) -> KeyContainer<'a> {
        KeyContainer {
            source,
            my_public: None,
            peer_public: None,
        }
    }

    /// A send-side container addressed to `peer`.
    pub fn to_peer(source: &'a dyn SharedSecretSource, peer: [u8; 32]) -> KeyContainer<'a> {
        KeyContainer {
            source,
            my_public: None,
            peer_public: Some(peer),
        }
    }

    /// A send-side container with an asserted local public key.
    pub fn with_keys(
        source: &'a dyn SharedSecretSource,
        my_public: [u8; 32],
        peer: [u8; 32],
    ) -> KeyContainer<'a> {
        KeyContainer {
            source,
            my_public: Some(my_public),
            peer_public: Some(peer),
        }
    }
}

/// Calculates the symmetric message key for a set of asymmetric keypairs
/// and encrypts/decrypts envelopes under it.
pub struct SecretCalculator<'a> {
    /// Expected wire type. Zero on receive means "accept whatever the wire
    /// declares"; after a successful decrypt it holds the declared type.
    pub message_type: u16,
    /// Protocol nonce. Generated on send when absent; parsed from the wire
    /// on receive.
    pub nonce: Option<[u8; 32]>,
    /// Optional fixed nonce input for derivations that must agree without
    /// a wire exchange (the timelock layer).
    pub deterministic_nonce: Option<[u8; 32]>,
    pub keys: Vec<KeyContainer<'a>>,
    combiner: SecretCombiner,
    secret: Option<Cell>,
    is_receiver: bool,
    is_calculated: bool,
}

impl<'a> SecretCalculator<'a> {
    pub fn new(
        combiner: SecretCombiner,
        message_type: u16,
        keys: Vec<KeyContainer<'a>>,
    ) -> SecretCalculator<'a> {
        SecretCalculator {
            message_type,
            nonce: None,
            deterministic_nonce: None,
            keys,
            combiner,
            secret: None,
            is_receiver: false,
            is_calculated: false,
        }
    }

    pub fn with_deterministic_nonce(mut self, dn: [u8; 32]) -> SecretCalculator<'a> {
        self.deterministic_nonce = Some(dn);
        self
    }

    /// Header length: nonce plus two public keys per configured pair.
    pub fn header_size(&self) -> usize {
        NONCE_SIZE + self.keys.len() * 64
    }

    /// Envelope length for a plaintext of `msg_len` bytes.
    pub fn encrypted_size(&self, msg_len: usize) -> usize {
        2 + self.header_size() + symmetric::encrypted_size(msg_len)
    }

    /// Plaintext length recovered from an envelope of `ct_len` bytes.
    pub fn decrypted_size(&self, ct_len: usize) -> Result<usize> {
        ct_len
            .checked_sub(2 + self.header_size() + ENCRYPTION_OVERHEAD)
            .ok_or(HybridError::Size)
    }

    /// Derive the sending key. Generates the nonce when absent.
    pub fn send(&mut self) -> Result<&Cell> {
        self.is_receiver = false;
        self.calculate_secret()?;
        Ok(self.secret.as_ref().expect("secret just calculated"))
    }

    /// Derive the receiving key. Headers must have been parsed.
    pub fn receive(&mut self) -> Result<&Cell> {
        self.is_receiver = true;
        self.calculate_secret()?;
        Ok(self.secret.as_ref().expect("secret just calculated"))
    }

    /// The message headers: nonce plus public key pairs in wire order.
    /// Contract: only valid after [`SecretCalculator::send`].
    pub fn headers(&self) -> Vec<u8> {
        assert!(self.is_calculated, "headers requested before key calculation");
        let mut out = Vec::with_capacity(self.header_size());
        out.extend_from_slice(&self.nonce.expect("nonce set by calculation"));
        for k in &self.keys {
            let (sender, receiver) = self.wire_order(k);
            out.extend_from_slice(&sender);
            out.extend_from_slice(&receiver);
        }
        out
    }

    /// Parse wire headers into the nonce and per-pair public keys.
    pub fn parse_headers(&mut self, headers: &[u8]) -> Result<()> {
        assert!(!self.keys.is_empty(), "header parse without configured keys");
        if headers.len() < self.header_size() {
            return Err(HybridError::HeaderSize);
        }
        let mut nonce = [0u8; 32];
        nonce.copy_from_slice(&headers[..NONCE_SIZE]);
        self.nonce = Some(nonce);
        for (i, k) in self.keys.iter_mut().enumerate() {
            let off = NONCE_SIZE + i * 64;
            let mut sender = [0u8; 32];
            let mut receiver = [0u8; 32];
            sender.copy_from_slice(&headers[off..off + 32]);
            receiver.copy_from_slice(&headers[off + 32..off + 64]);
            // On the wire the pair reads (sender, receiver); locally the
            // receiver slot is ours.
            k.my_public = Some(receiver);
            k.peer_public = Some(sender);
        }
        Ok(())
    }

    /// Encrypt `msg` into a full envelope. Derives the key if necessary and
    /// destroys the secret on every exit path.
    pub fn encrypt(&mut self, msg: &[u8]) -> Result<Vec<u8>> {
        if !self.is_calculated {
            self.send()?;
        }
        let result = self.encrypt_inner(msg);
        self.destroy_secret();
        result
    }

    fn encrypt_inner(&self, msg: &[u8]) -> Result<Vec<u8>> {
        let secret = self.secret.as_ref().expect("secret calculated");
        let ct = symmetric::encrypt(secret.bytes(), msg)?;
        let mut out = Vec::with_capacity(self.encrypted_size(msg.len()));
        out.extend_from_slice(&self.message_type.to_be_bytes());
        out.extend_from_slice(&self.headers());
        out.extend_from_slice(&ct);
        Ok(out)
    }

    /// Decrypt a full envelope. A configured non-zero `message_type` must
    /// match the wire; afterwards `message_type` holds the declared type.
    /// Destroys the secret on every exit path.
    pub fn decrypt(&mut self, msg: &[u8]) -> Result<Vec<u8>> {
        if msg.len() < 2 {
            return Err(HybridError::HeaderSize);
        }
        let wire_type = u16::from_be_bytes([msg[0], msg[1]]);
        if self.message_type != 0 && self.message_type != wire_type {
            return Err(HybridError::MessageType);
        }
        self.message_type = wire_type;
        self.parse_headers(&msg[2..])?;
        let ct = &msg[2 + self.header_size()..];
        if ct.len() < ENCRYPTION_OVERHEAD + 1 {
            return Err(HybridError::Size);
        }
        let result = (|| {
            self.receive()?;
            let secret = self.secret.as_ref().expect("secret calculated");
            symmetric::decrypt(secret.bytes(), ct).map_err(HybridError::from)
        })();
        self.destroy_secret();
        result
    }

    /// Destroy the derived secret. Idempotent.
    pub fn destroy_secret(&mut self) {
        if let Some(mut s) = self.secret.take() {
            s.destroy();
        }
    }

    fn wire_order(&self, k: &KeyContainer<'_>) -> ([u8; 32], [u8; 32]) {
        let my = k.my_public.expect("public key set by calculation");
        let peer = k.peer_public.expect("peer public key set");
        if self.is_receiver {
            (peer, my)
        } else {
            (my, peer)
        }
    }

    fn calculate_secret(&mut self) -> Result<()> {
        assert!(!self.keys.is_empty(), "secret calculator without keys");
        if self.nonce.is_none() {
            assert!(!self.is_receiver, "receive before header parse");
            let mut n = [0u8; 32];
            OsRng.fill_bytes(&mut n);
            self.nonce = Some(n);
        }
        let mut state: Option<Cell> = None;
        for i in 0..self.keys.len() {
            let peer = self.keys[i]
                .peer_public
                .expect("peer public key not configured");
            let (my_public, mut dh) = self.keys[i]
                .source
                .shared_secret(self.keys[i].my_public.as_ref(), &peer)?;
            self.keys[i].my_public = Some(my_public);
            let next = match &state {
                None => self.combiner.combine(PROTOCOL_CONSTANT, dh.bytes()),
                Some(s) => self.combiner.combine(s.bytes(), dh.bytes()),
            };
            dh.destroy();
            if let Some(mut s) = state.take() {
                s.destroy();
            }
            state = Some(next);
        }
        self.is_calculated = true;
        let nonce_hash = self.nonce_hash();
        let mut state = state.expect("at least one key");
        self.secret = Some(self.combiner.combine(state.bytes(), &nonce_hash));
        state.destroy();
        Ok(())
    }

    fn nonce_hash(&self) -> [u8; 32] {
        let mut h = Sha256::new();
        h.update(self.message_type.to_be_bytes());
        h.update(self.nonce.expect("nonce set by calculation"));
        for k in &self.keys {
            let (sender, receiver) = self.wire_order(k);
            h.update(sender);
            h.update(receiver);
        }
        if let Some(dn) = &self.deterministic_nonce {
            h.update(dn);
        }
        h.finalize().into()
    }
}

impl Drop for SecretCalculator<'_> {
    fn drop(&mut self) {
        self.destroy_secret();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{EphemeralKey, LongTermKey};
    use crate::memory::{EngineRef, UnprotectedEngine};
    use std::sync::Arc;

    fn engine() -> EngineRef {
        Arc::new(UnprotectedEngine::with_random_key())
    }

    fn combiner(engine: &EngineRef) -> SecretCombiner {
        SecretCombiner::new(engine.clone())
    }

    #[test]
    fn test_three_dh_secret_agreement() {
        let engine = engine();
        let k1 = LongTermKey::generate(engine.clone()).unwrap();
        let k2 = LongTermKey::generate(engine.clone()).unwrap();
        let e1 = EphemeralKey::new(engine.clone());
        let e2 = EphemeralKey::new(engine.clone());

        let mut sender = SecretCalculator::new(
            combiner(&engine),
            512,
            vec![
                KeyContainer::with_keys(&k1, *k1.public_key(), *k2.public_key()),
                KeyContainer::to_peer(&e1, *k2.public_key()),
                KeyContainer::to_peer(&e2, *k1.public_key()),
            ],
        );
        let secret1 = sender.send().unwrap().bytes().to_vec();
        let headers = sender.headers();

        let mut receiver = SecretCalculator::new(
            combiner(&engine),
            512,
            vec![
                KeyContainer::new(&k2),
                KeyContainer::new(&k2),
                KeyContainer::new(&k1),
            ],
        );
        receiver.parse_headers(&headers).unwrap();
        let secret2 = receiver.receive().unwrap().bytes().to_vec();
        assert_eq!(secret1, secret2);
    }

    #[test]
    fn test_envelope_roundtrip() {
        let engine = engine();
        let msg = b"this is a secret message that is encrypted";
        let k1 = LongTermKey::generate(engine.clone()).unwrap();
        let k2 = LongTermKey::generate(engine.clone()).unwrap();
        let e1 = EphemeralKey::new(engine.clone());
        let e2 = EphemeralKey::new(engine.clone());

        let mut sender = SecretCalculator::new(
            combiner(&engine),
            400,
            vec![
                KeyContainer::with_keys(&k1, *k1.public_key(), *k2.public_key()),
                KeyContainer::to_peer(&e1, *k2.public_key()),
                KeyContainer::to_peer(&e2, *k1.public_key()),
            ],
        );
        let encrypted = sender.encrypt(msg).unwrap();
        assert_eq!(encrypted.len(), sender.encrypted_size(msg.len()));

        // Receiver with message_type 0 accepts what the wire declares.
        let mut receiver = SecretCalculator::new(
            combiner(&engine),
            0,
            vec![
                KeyContainer::new(&k2),
                KeyContainer::new(&k2),
                KeyContainer::new(&k1),
            ],
        );
        let out = receiver.decrypt(&encrypted).unwrap();
        assert_eq!(out.as_slice(), msg);
        assert_eq!(receiver.message_type, 400);
    }

    #[test]
    fn test_message_type_mismatch_rejected() {
        let engine = engine();
        let k1 = LongTermKey::generate(engine.clone()).unwrap();
        let k2 = LongTermKey::generate(engine.clone()).unwrap();

        let mut sender = SecretCalculator::new(
            combiner(&engine),
            7,
            vec![KeyContainer::with_keys(&k1, *k1.public_key(), *k2.public_key())],
        );
        let encrypted = sender.encrypt(b"payload").unwrap();

        let mut receiver =
            SecretCalculator::new(combiner(&engine), 8, vec![KeyContainer::new(&k2)]);
        assert!(matches!(
            receiver.decrypt(&encrypted),
            Err(HybridError::MessageType)
        ));
    }

    #[test]
    fn test_truncated_header_rejected() {
        let engine = engine();
        let k1 = LongTermKey::generate(engine.clone()).unwrap();
        let k2 = LongTermKey::generate(engine.clone()).unwrap();

        let mut sender = SecretCalculator::new(
            combiner(&engine),
            7,
            vec![KeyContainer::with_keys(&k1, *k1.public_key(), *k2.public_key())],
        );
        let encrypted = sender.encrypt(b"payload").unwrap();

        let mut receiver =
            SecretCalculator::new(combiner(&engine), 7, vec![KeyContainer::new(&k2)]);
        let truncated = &encrypted[..receiver.header_size()];
        assert!(matches!(
            receiver.decrypt(truncated),
            Err(HybridError::HeaderSize)
        ));
    }

    #[test]
    fn test_ciphertext_corruption_rejected() {
        let engine = engine();
        let k1 = LongTermKey::generate(engine.clone()).unwrap();
        let k2 = LongTermKey::generate(engine.clone()).unwrap();

        let mut sender = SecretCalculator::new(
            combiner(&engine),
            7,
            vec![KeyContainer::with_keys(&k1, *k1.public_key(), *k2.public_key())],
        );
        let mut encrypted = sender.encrypt(b"payload").unwrap();
        let last = encrypted.len() - 1;
        encrypted[last] ^= 0x01;

        let mut receiver =
            SecretCalculator::new(combiner(&engine), 0, vec![KeyContainer::new(&k2)]);
        assert!(matches!(
            receiver.decrypt(&encrypted),
            Err(HybridError::Decrypt)
        ));
    }

    #[test]
    fn test_deterministic_nonce_changes_secret() {
        let engine = engine();
        let k1 = LongTermKey::generate(engine.clone()).unwrap();
        let k2 = LongTermKey::generate(engine.clone()).unwrap();
        let nonce = [0x42u8; 32];

        let secret_with = |dn: Option<[u8; 32]>| {
            let mut c = SecretCalculator::new(
                combiner(&engine),
                9,
                vec![KeyContainer::with_keys(&k1, *k1.public_key(), *k2.public_key())],
            );
            c.nonce = Some(nonce);
            c.deterministic_nonce = dn;
            let s = c.send().unwrap().bytes().to_vec();
            s
        };
        assert_eq!(secret_with(None), secret_with(None));
        assert_ne!(secret_with(None), secret_with(Some([1u8; 32])));
        assert_ne!(secret_with(Some([1u8; 32])), secret_with(Some([2u8; 32])));
    }
}
