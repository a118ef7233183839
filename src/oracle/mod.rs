//! Oracle state machine.
//!
//! An oracle owns three keys: a long-term identity key, a rotating
//! short-term key, and the timelock ratchet. Incoming envelopes are
//! unwrapped through the hybrid layer and processed in a fixed order that
//! is a security invariant:
//!
//! 1. record set-semaphores — unconditionally, before anything can fail
//! 2. check the time policy
//! 3. check the test-semaphores against the signal store
//! 4. unwrap the timelock layer of the share
//!
//! A distress semaphore therefore lands in durable storage even when a
//! later check rejects the request.

use std::sync::Arc;

use thiserror::Error;

use crate::clock::Clock;
use crate::crypto::{KeyError, LongTermKey, RatchetKey, RotatingKey, SecretCombiner};
use crate::hybrid::{HybridError, KeyContainer, SecretCalculator};
use crate::memory::{EngineRef, SecretBuffer};
use crate::protocol::ratchet_keys::RatchetPublicKeyList;
use crate::protocol::{
    OracleMessage, ProtocolError, ORACLE_ENVELOPE_TYPE, ORACLE_RESPONSE_TYPE,
};
use crate::signals::SignalStore;

const ZERO_SEMAPHORE: [u8; 32] = [0u8; 32];

#[derive(Error, Debug)]
pub enum OracleError {
    #[error("time policy violation")]
    TimePolicy,
    #[error("signal is set")]
    SignalSet,
    #[error("response key mismatch")]
    WrongResponseKey,
    #[error("unhandled message type")]
    UnhandledMessageType,
    #[error("signal store failure: {0}")]
    Signal(#[from] crate::signals::SignalError),
    #[error(transparent)]
    Hybrid(#[from] HybridError),
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    Protocol(ProtocolError),
}

impl From<ProtocolError> for OracleError {
    fn from(e: ProtocolError) -> OracleError {
        match e {
            ProtocolError::WrongResponseKey => OracleError::WrongResponseKey,
            ProtocolError::TimePolicy => OracleError::TimePolicy,
            other => OracleError::Protocol(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, OracleError>;

pub struct Oracle {
    engine: EngineRef,
    clock: Clock,
    signals: Arc<dyn SignalStore>,
    long_term: LongTermKey,
    short_term: RotatingKey,
    timelock: RatchetKey,
}

impl Oracle {
    /// Generate a fresh oracle. The ratchet starts at `start_time` and
    /// ticks every `ratchet_time` seconds; the short-term key keeps its
    /// previous generation for `time_to_expire` seconds.
    pub fn generate(
        signals: Arc<dyn SignalStore>,
        engine: EngineRef,
        clock: Clock,
        start_time: i64,
        ratchet_time: i64,
        time_to_expire: i64,
    ) -> Result<Oracle> {
        let short_term = RotatingKey::new(time_to_expire, engine.clone(), clock.clone())?;
        let timelock = RatchetKey::generate(engine.clone(), clock.clone(), start_time, ratchet_time)?;
        let long_term = LongTermKey::generate(engine.clone())?;
        Ok(Oracle {
            engine,
            clock,
            signals,
            long_term,
            short_term,
            timelock,
        })
    }

    /// Rebuild an oracle from its saved long-term and ratchet elements.
    /// The short-term key is always fresh after a restart.
    pub fn restore(
        signals: Arc<dyn SignalStore>,
        engine: EngineRef,
        clock: Clock,
        long_term_key: SecretBuffer,
        timelock_key: SecretBuffer,
        time_to_expire: i64,
    ) -> Result<Oracle> {
        let short_term = RotatingKey::new(time_to_expire, engine.clone(), clock.clone())?;
        let timelock = RatchetKey::restore(engine.clone(), clock.clone(), timelock_key)?;
        let long_term = LongTermKey::from_element(engine.clone(), long_term_key)?;
        Ok(Oracle {
            engine,
            clock,
            signals,
            long_term,
            short_term,
            timelock,
        })
    }

    /// The persistent private elements: (long-term, timelock ratchet).
    pub fn save(self) -> (SecretBuffer, SecretBuffer) {
        (
            self.long_term.into_private_element(),
            self.timelock.into_private_element(),
        )
    }

    /// Current (long-term, short-term) public keys.
    pub fn public_keys(&self) -> ([u8; 32], [u8; 32]) {
        (*self.long_term.public_key(), *self.short_term.public_key())
    }

    /// Rotate the short-term key.
    pub fn rotate_short_term(&mut self) -> Result<[u8; 32]> {
        Ok(self.short_term.rotate()?)
    }

    /// Publishable list of the next `count` timelock public keys.
    pub fn timelock_keys(&self, count: usize) -> Result<RatchetPublicKeyList> {
        Ok(self.timelock.generator()?.public_keys(count))
    }

    /// Advance the timelock ratchet; returns seconds until the next tick.
    pub fn advance(&self) -> Result<i64> {
        Ok(self.timelock.advance()?)
    }

    /// Process one incoming envelope and build the response envelope.
    ///
    /// Policy and signal failures surface as errors; set-semaphores have
    /// been recorded by then regardless.
    pub fn receive_msg(&self, d: &[u8]) -> Result<Vec<u8>> {
        let mut outer = SecretCalculator::new(
            SecretCombiner::new(self.engine.clone()),
            0,
            vec![
                KeyContainer::new(&self.short_term),
                KeyContainer::new(&self.long_term),
            ],
        );
        let payload = outer.decrypt(d)?;

        let (response_payload, response_key) = match outer.message_type {
            ORACLE_ENVELOPE_TYPE => {
                let msg = OracleMessage::decrypt_inner(&self.long_term, &self.engine, &payload)?;
                self.verify_oracle_message(msg)?
            }
            t => {
                log::warn!("oracle: dropping envelope with unhandled message type {t}");
                return Err(OracleError::UnhandledMessageType);
            }
        };

        let client_short = outer.keys[0]
            .peer_public
            .expect("peer keys set by header parse");
        let client_long = outer.keys[1]
            .peer_public
            .expect("peer keys set by header parse");

        let mut response = SecretCalculator::new(
            SecretCombiner::new(self.engine.clone()),
            ORACLE_RESPONSE_TYPE,
            vec![
                KeyContainer::with_keys(&self.short_term, *self.short_term.public_key(), client_short),
                KeyContainer::with_keys(&self.long_term, *self.long_term.public_key(), client_long),
                KeyContainer::with_keys(&self.short_term, *self.short_term.public_key(), response_key),
            ],
        );
        Ok(response.encrypt(&response_payload)?)
    }

    /// The fixed-order verification pipeline. Returns the unwrapped share
    /// and the client's response public key.
    fn verify_oracle_message(&self, mut msg: OracleMessage) -> Result<(Vec<u8>, [u8; 32])> {
        // Distress first. Nothing below may run before this.
        self.set_signals(&msg)?;

        let now = self.clock.now();
        if msg.valid_from > 0 && msg.valid_from > now {
            return Err(OracleError::TimePolicy);
        }
        if msg.valid_to > 0 && msg.valid_to < now {
            return Err(OracleError::TimePolicy);
        }

        self.test_signals(&msg)?;

        msg.decrypt_share(&self.long_term, &self.timelock, &self.engine)?;
        let response_key = msg.response_public_key;
        Ok((std::mem::take(&mut msg.share), response_key))
    }

    fn set_signals(&self, msg: &OracleMessage) -> Result<()> {
        let mut first_error = None;
        for s in &msg.set_semaphores {
            if *s == ZERO_SEMAPHORE {
                continue;
            }
            if let Err(e) = self.signals.set_signal(s, 0, 0) {
                log::warn!("oracle: recording set-semaphore failed: {e}");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            } else {
                log::info!("oracle: recorded semaphore {}", hex::encode(&s[..8]));
            }
        }
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    fn test_signals(&self, msg: &OracleMessage) -> Result<()> {
        for s in &msg.test_semaphores {
            if *s == ZERO_SEMAPHORE {
                continue;
            }
            if !self.signals.test_signal(s) {
                return Err(OracleError::SignalSet);
            }
        }
        Ok(())
    }
}
