//! Cypherlock protocol core.
//!
//! A cryptographic time-lock and dead-man's switch: a secret is encrypted
//! so it can only be revealed after a chosen time window opens, before it
//! closes, while no distress semaphore has been raised, and only with the
//! cooperation of network oracles holding forward-secure ratcheting
//! time-release keys.
//!
//! The crate covers the cryptographic core: the layered hybrid encryption
//! protocol ([`hybrid`]), the forward-secure ratchet ([`crypto::ratchet`]),
//! the oracle message formats and state machine ([`protocol`], [`oracle`]),
//! the publication-audit merkle tree ([`merkle`]), and the
//! memory-protected key substrate everything is built on ([`memory`]).
//! Network transport, durable signal storage, and the user-facing shell
//! are external; their contracts live in [`signals`] and [`client`].

pub mod client;
pub mod clock;
pub mod crypto;
pub mod hybrid;
pub mod memory;
pub mod merkle;
pub mod oracle;
pub mod protocol;
pub mod signals;

pub use clock::Clock;
#[cfg(unix)]
pub use memory::GuardedEngine;
pub use memory::{Cell, Engine, EngineRef, MemoryError, SecretBuffer, UnprotectedEngine};

pub use crypto::{
    EphemeralKey, KeyError, LongTermKey, RatchetGenerator, RatchetKey, RotatingKey,
    SecretCombiner, SharedSecretSource, SigningKey, SymmetricKey,
};
pub use hybrid::{HybridError, KeyContainer, SecretCalculator, PROTOCOL_CONSTANT};
pub use merkle::{MerkleTree, Path, PathElement};
pub use oracle::{Oracle, OracleError};
pub use protocol::{
    OracleFuture, OracleMessage, OracleMessageContainer, ProtocolError, RatchetPublicKeyList,
    SetSemaphoreMsg, ShareMsg, TimeKey, WireError,
};
pub use signals::{MemorySignalStore, SignalError, SignalStore};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
