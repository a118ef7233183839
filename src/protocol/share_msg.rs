//! Share messages: the innermost payload an oracle hands back.
//!
//! A share message is padded to exactly [`SHARE_MSG_PAD_SIZE`] before
//! encryption, so every encrypted share message is exactly
//! [`SHARE_MSG_SIZE`] bytes and the ciphertext length leaks nothing about
//! the embedded share.

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::wire::{Reader, WireError, Writer};
use super::{Result, SHARE_MSG_TYPE_ID};
use crate::crypto::padding::{add_padding, remove_padding, PADDING_OVERHEAD};
use crate::crypto::symmetric::{self, ENCRYPTION_OVERHEAD};

/// Maximum size of an embedded share.
pub const MAX_SHARE_SIZE: usize = 256;

/// Fixed pre-encryption size of an encoded share message.
pub const SHARE_MSG_PAD_SIZE: usize = 512;

/// Exact size of an encrypted share message.
pub const SHARE_MSG_SIZE: usize = SHARE_MSG_PAD_SIZE + PADDING_OVERHEAD + ENCRYPTION_OVERHEAD;

/// A share of the locked secret, bound to the issuing oracle's long-term
/// key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct ShareMsg {
    pub share: Vec<u8>,
    pub oracle_key: [u8; 32],
}

impl ShareMsg {
    /// Tagged binary encoding. The share length bound is enforced here.
    pub fn encode(&self) -> std::result::Result<Vec<u8>, WireError> {
        if self.share.len() > MAX_SHARE_SIZE {
            return Err(WireError::BufferSize);
        }
        let mut w = Writer::new(SHARE_MSG_TYPE_ID);
        w.put_bytes(&self.share)?;
        w.put_array32(&self.oracle_key);
        Ok(w.finish())
    }

    pub fn decode(d: &[u8]) -> std::result::Result<ShareMsg, WireError> {
        let mut r = Reader::new(d, SHARE_MSG_TYPE_ID)?;
        let share = r.bytes()?.to_vec();
        let oracle_key = r.array32()?;
        r.finish()?;
        if share.len() > MAX_SHARE_SIZE {
            return Err(WireError::BufferSize);
        }
        Ok(ShareMsg { share, oracle_key })
    }

    /// Encode, pad to the fixed size, and encrypt. The result is always
    /// [`SHARE_MSG_SIZE`] bytes.
    pub fn encrypt(&self, key: &[u8]) -> Result<Vec<u8>> {
        let encoded = Zeroizing::new(self.encode()?);
        let padded = Zeroizing::new(add_padding(&encoded, SHARE_MSG_PAD_SIZE, None)?);
        let ct = symmetric::encrypt(key, &padded)?;
        debug_assert_eq!(ct.len(), SHARE_MSG_SIZE);
        Ok(ct)
    }

    /// Decrypt, unpad, and decode an encrypted share message.
    pub fn decrypt(msg: &[u8], key: &[u8]) -> Result<ShareMsg> {
        let padded = Zeroizing::new(symmetric::decrypt(key, msg)?);
        let unpadded = remove_padding(&padded)?;
        Ok(ShareMsg::decode(unpadded)?)
    }
}
