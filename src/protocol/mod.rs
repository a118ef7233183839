//! Oracle message codecs: the tag-prefixed binary wire format, the share
//! and semaphore messages, the oracle message itself with its layered
//! encryption, the at-rest container, and the tagged type registry.

pub mod container;
pub mod oracle_msg;
pub mod ratchet_keys;
pub mod registry;
pub mod semaphore_msg;
pub mod share_msg;
pub mod wire;

pub use container::{OracleFuture, OracleMessageContainer};
pub use oracle_msg::OracleMessage;
pub use ratchet_keys::{RatchetPublicKeyList, TimeKey};
pub use registry::Message;
pub use semaphore_msg::SetSemaphoreMsg;
pub use share_msg::{ShareMsg, MAX_SHARE_SIZE, SHARE_MSG_PAD_SIZE, SHARE_MSG_SIZE};
pub use wire::WireError;

use thiserror::Error;

use crate::crypto::symmetric::SymmetricError;
use crate::crypto::KeyError;
use crate::hybrid::HybridError;
use crate::memory::MemoryError;

/// TypeID allocation. Object tags and envelope message types are disjoint.
pub const SET_SEMAPHORE_MSG_TYPE_ID: u16 = 1001;
pub const SHARE_MSG_TYPE_ID: u16 = 1002;
pub const ORACLE_MSG_CONTAINER_TYPE_ID: u16 = 1080;
pub const ORACLE_MSG_TYPE_ID: u16 = 1098;

/// Envelope message type of a client request to an oracle.
pub const ORACLE_ENVELOPE_TYPE: u16 = 1020;
/// Envelope message type of an oracle response.
pub const ORACLE_RESPONSE_TYPE: u16 = 1021;
/// Message type of the inner envelope and the timelock layer.
pub const INNER_ENVELOPE_TYPE: u16 = 0xf0;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error(transparent)]
    Symmetric(#[from] SymmetricError),
    #[error(transparent)]
    Hybrid(#[from] HybridError),
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    Memory(#[from] MemoryError),
    #[error("response key mismatch")]
    WrongResponseKey,
    #[error("time policy violation")]
    TimePolicy,
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
