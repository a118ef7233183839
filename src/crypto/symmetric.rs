//! SecretBox-style authenticated encryption.
//!
//! XChaCha20-Poly1305 with a random 24-byte nonce and a 16-byte tag over a
//! 32-byte key. Ciphertext wire format:
//!
//! ```text
//! [ nonce (24 bytes) | ciphertext + tag (16 bytes) ]
//! ```

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

pub const NONCE_SIZE: usize = 24;
pub const TAG_SIZE: usize = 16;

/// Bytes added by encryption: nonce plus authentication tag.
pub const ENCRYPTION_OVERHEAD: usize = NONCE_SIZE + TAG_SIZE;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SymmetricError {
    #[error("input size implausible")]
    Size,
    #[error("could not decrypt")]
    Decrypt,
}

pub type Result<T> = std::result::Result<T, SymmetricError>;

/// Size of `msg` after encryption.
pub fn encrypted_size(msg_len: usize) -> usize {
    msg_len + ENCRYPTION_OVERHEAD
}

/// Size of a ciphertext after decryption; `Size` when too short to carry a
/// nonce and tag.
pub fn decrypted_size(ct_len: usize) -> Result<usize> {
    ct_len.checked_sub(ENCRYPTION_OVERHEAD).ok_or(SymmetricError::Size)
}

/// Encrypt `msg` under the first 32 bytes of `key`.
pub fn encrypt(key: &[u8], msg: &[u8]) -> Result<Vec<u8>> {
    if key.len() < 32 {
        return Err(SymmetricError::Size);
    }
    let cipher = XChaCha20Poly1305::new_from_slice(&key[..32]).map_err(|_| SymmetricError::Size)?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = XNonce::from_slice(&nonce_bytes);

    let ciphertext = cipher.encrypt(nonce, msg).map_err(|_| SymmetricError::Size)?;

    let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt a `nonce || ciphertext+tag` buffer under the first 32 bytes of
/// `key`. Fails with `Size` on truncated input and `Decrypt` on a tag
/// mismatch.
pub fn decrypt(key: &[u8], msg: &[u8]) -> Result<Vec<u8>> {
    if msg.len() < ENCRYPTION_OVERHEAD {
        return Err(SymmetricError::Size);
    }
    if key.len() < 32 {
        return Err(SymmetricError::Size);
    }
    let (nonce_bytes, ciphertext) = msg.split_at(NONCE_SIZE);
    let nonce = XNonce::from_slice(nonce_bytes);

    let cipher = XChaCha20Poly1305::new_from_slice(&key[..32]).map_err(|_| SymmetricError::Size)?;
    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| SymmetricError::Decrypt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        let msg = b"attack at dawn";
        let ct = encrypt(&key, msg).unwrap();
        assert_eq!(ct.len(), encrypted_size(msg.len()));
        assert_eq!(decrypted_size(ct.len()).unwrap(), msg.len());
        let pt = decrypt(&key, &ct).unwrap();
        assert_eq!(pt.as_slice(), msg);
    }

    #[test]
    fn test_empty_message_roundtrip() {
        let key = [7u8; 32];
        let ct = encrypt(&key, b"").unwrap();
        assert_eq!(ct.len(), ENCRYPTION_OVERHEAD);
        assert!(decrypt(&key, &ct).unwrap().is_empty());
    }

    #[test]
    fn test_every_flipped_byte_rejects() {
        let key = [3u8; 32];
        let msg = b"integrity matters";
        let ct = encrypt(&key, msg).unwrap();
        for i in 0..ct.len() {
            let mut bad = ct.clone();
            bad[i] ^= 0x01;
            assert_eq!(decrypt(&key, &bad).err(), Some(SymmetricError::Decrypt), "byte {i}");
        }
    }

    #[test]
    fn test_wrong_key_rejects() {
        let ct = encrypt(&[1u8; 32], b"msg").unwrap();
        assert_eq!(decrypt(&[2u8; 32], &ct).err(), Some(SymmetricError::Decrypt));
    }

    #[test]
    fn test_short_inputs() {
        assert_eq!(decrypt(&[0u8; 32], &[0u8; 39]).err(), Some(SymmetricError::Size));
        assert_eq!(encrypt(&[0u8; 16], b"x").err(), Some(SymmetricError::Size));
        assert_eq!(decrypted_size(10).err(), Some(SymmetricError::Size));
    }
}
