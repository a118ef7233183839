//! At-rest containers and the pending exchange future.
//!
//! A container survives on the client between lock creation and reveal.
//! It holds the prebuilt encrypted oracle message together with everything
//! needed later: the response private key, the share message key, and the
//! policy window. At rest the whole container is one secretbox under the
//! caller's container key.

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::registry::{self, Message};
use super::{
    ProtocolError, Result, WireError, ORACLE_ENVELOPE_TYPE, ORACLE_RESPONSE_TYPE,
};
use crate::clock::Clock;
use crate::crypto::constant_time::eq_32;
use crate::crypto::symmetric;
use crate::crypto::{KeyError, LongTermKey, SecretCombiner, SymmetricKey};
use crate::hybrid::{KeyContainer, SecretCalculator};
use crate::memory::EngineRef;
use crate::protocol::{OracleMessage, ShareMsg};

/// Resolves an oracle URL to the oracle's current short-term public key.
pub type ShortTermKeyFactory<'a> = dyn Fn(&[u8]) -> Result<[u8; 32]> + 'a;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct OracleMessageContainer {
    pub valid_from: i64,
    pub valid_to: i64,
    pub share_threshold: i32,
    pub oracle_long_term_key: [u8; 32],
    pub response_public_key: [u8; 32],
    /// Private key that decrypts the oracle's reply.
    pub response_private_key: Vec<u8>,
    /// Symmetric key that opens the inner share message.
    pub share_msg_key: Vec<u8>,
    pub oracle_url: Vec<u8>,
    /// The prebuilt encrypted oracle message.
    pub oracle_message: Vec<u8>,
}

impl OracleMessageContainer {
    /// Encrypt the container under `key` for storage at rest.
    pub fn encrypt(&self, key: &[u8]) -> Result<Vec<u8>> {
        let encoded = Zeroizing::new(registry::marshal(&Message::Container(self.clone()))?);
        Ok(symmetric::encrypt(key, &encoded)?)
    }

    /// Decrypt an at-rest container.
    pub fn decrypt(key: &[u8], d: &[u8]) -> Result<OracleMessageContainer> {
        let plain = Zeroizing::new(symmetric::decrypt(key, d)?);
        match registry::unmarshal(&plain)? {
            Message::Container(c) => Ok(c),
            _ => Err(WireError::MessageType.into()),
        }
    }

    /// Open a stored container and build the wire envelope for its oracle.
    ///
    /// Checks the container's validity window, generates the single-use
    /// response key, and encrypts the prebuilt oracle message to the
    /// oracle's short-term and long-term keys. The returned future carries
    /// everything needed to unwrap the reply.
    pub fn send(
        container_key: &[u8],
        d: &[u8],
        short_term_key: &ShortTermKeyFactory<'_>,
        engine: &EngineRef,
        clock: &Clock,
    ) -> Result<OracleFuture> {
        let container = OracleMessageContainer::decrypt(container_key, d)?;
        let now = clock.now();
        if container.valid_from > 0 && container.valid_from > now {
            return Err(ProtocolError::TimePolicy);
        }
        if container.valid_to > 0 && container.valid_to < now {
            return Err(ProtocolError::TimePolicy);
        }

        let single_response = LongTermKey::generate(engine.clone())?;
        let oracle_short_term = short_term_key(&container.oracle_url)?;

        let mut tsc = SecretCalculator::new(
            SecretCombiner::new(engine.clone()),
            ORACLE_ENVELOPE_TYPE,
            vec![
                KeyContainer::with_keys(
                    &single_response,
                    *single_response.public_key(),
                    oracle_short_term,
                ),
                KeyContainer::with_keys(
                    &single_response,
                    *single_response.public_key(),
                    container.oracle_long_term_key,
                ),
            ],
        );
        let message = tsc.encrypt(&container.oracle_message)?;

        let single_response_private_key = single_response
            .private_element()
            .with_bytes(|b| Ok::<_, ProtocolError>(Zeroizing::new(b.to_vec())))?;

        Ok(OracleFuture {
            message,
            url: container.oracle_url.clone(),
            share_threshold: container.share_threshold,
            oracle_long_term_key: container.oracle_long_term_key,
            response_private_key: Zeroizing::new(container.response_private_key.clone()),
            share_msg_key: Zeroizing::new(container.share_msg_key.clone()),
            single_response_private_key,
        })
    }
}

impl OracleMessage {
    /// Build the complete at-rest container for this message.
    ///
    /// Canonicalizes the semaphores, generates the response keypair and
    /// the share message key, wraps the share (share message, then the
    /// optional timelock layer), builds the inner envelope, and encrypts
    /// the resulting container under `container_key`.
    pub fn encrypt_to_container(
        mut self,
        container_key: &[u8],
        engine: &EngineRef,
    ) -> Result<Vec<u8>> {
        self.canonicalize_semaphores();

        let response_key = LongTermKey::generate(engine.clone())?;
        self.response_public_key = *response_key.public_key();

        let share_key = SymmetricKey::generate(engine)?;
        let share_key_bytes = share_key.export()?;

        let share_msg = ShareMsg {
            share: std::mem::take(&mut self.share),
            oracle_key: self.long_term_oracle_public_key,
        };
        self.share = share_msg.encrypt(&share_key_bytes)?;
        self.encrypt_share(engine)?;

        let oracle_message = self.encrypt_inner(&response_key, engine)?;

        let response_private_key = response_key
            .private_element()
            .with_bytes(|b| Ok::<_, ProtocolError>(b.to_vec()))?;

        let container = OracleMessageContainer {
            valid_from: self.valid_from,
            valid_to: self.valid_to,
            share_threshold: self.share_threshold,
            oracle_long_term_key: self.long_term_oracle_public_key,
            response_public_key: *response_key.public_key(),
            response_private_key,
            share_msg_key: share_key_bytes.to_vec(),
            oracle_url: std::mem::take(&mut self.oracle_url),
            oracle_message,
        };
        share_key.destroy();
        response_key.destroy();
        container.encrypt(container_key)
    }
}

/// Pending oracle exchange produced by [`OracleMessageContainer::send`].
pub struct OracleFuture {
    /// The envelope to deliver to the oracle.
    pub message: Vec<u8>,
    /// Where to deliver it.
    pub url: Vec<u8>,
    pub share_threshold: i32,
    oracle_long_term_key: [u8; 32],
    response_private_key: Zeroizing<Vec<u8>>,
    share_msg_key: Zeroizing<Vec<u8>>,
    single_response_private_key: Zeroizing<Vec<u8>>,
}

impl OracleFuture {
    /// Unwrap an oracle reply back to the plaintext share.
    ///
    /// The reply is authenticated against three DHs, receiver side
    /// `[single_response, single_response, response]`, mirroring the
    /// oracle's `[short_term, long_term, short_term]` sender order. The
    /// payload is the encrypted share message; it must carry the expected
    /// oracle key.
    pub fn receive(&self, reply: &[u8], engine: &EngineRef) -> Result<Zeroizing<Vec<u8>>> {
        let single = restore_key(engine, &self.single_response_private_key)?;
        let response = restore_key(engine, &self.response_private_key)?;

        let mut tsc = SecretCalculator::new(
            SecretCombiner::new(engine.clone()),
            ORACLE_RESPONSE_TYPE,
            vec![
                KeyContainer::new(&single),
                KeyContainer::new(&single),
                KeyContainer::new(&response),
            ],
        );
        let payload = Zeroizing::new(tsc.decrypt(reply)?);

        let share_msg = ShareMsg::decrypt(&payload, &self.share_msg_key)?;
        if !eq_32(&share_msg.oracle_key, &self.oracle_long_term_key) {
            return Err(ProtocolError::WrongResponseKey);
        }
        Ok(Zeroizing::new(share_msg.share.clone()))
    }
}

fn restore_key(engine: &EngineRef, private: &[u8]) -> Result<LongTermKey> {
    if private.len() != 32 {
        return Err(KeyError::Size.into());
    }
    let element = engine.element(32);
    let mut copy = private.to_vec();
    element.set(&mut copy)?;
    Ok(LongTermKey::from_element(engine.clone(), element)?)
}
