//! Randomized message padding.
//!
//! A padded message is `max(len(msg), pad_length) + 8` bytes: the message,
//! keystream filler, and a trailing 8-byte big-endian length field. Filler
//! bytes come from the raw ChaCha20 keystream of a 32-byte pad key so the
//! padding is indistinguishable from ciphertext.

use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::ChaCha20;
use rand::rngs::OsRng;
use rand::RngCore;
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use super::symmetric::{Result, SymmetricError};

/// Bytes added by padding: the length trailer.
pub const PADDING_OVERHEAD: usize = 8;

/// Length of `msg` after padding to `pad_length`.
pub fn padded_size(msg_len: usize, pad_length: usize) -> usize {
    msg_len.max(pad_length) + PADDING_OVERHEAD
}

/// Pad `msg` up to `pad_length`.
///
/// `pad_key` selects the filler keystream key: `None` draws a fresh random
/// key, an all-zero key is randomized in place (the caller observes the
/// chosen key), any other value is used as given.
pub fn add_padding(msg: &[u8], pad_length: usize, pad_key: Option<&mut [u8; 32]>) -> Result<Vec<u8>> {
    let mut key = [0u8; 32];
    match pad_key {
        None => OsRng.fill_bytes(&mut key),
        Some(k) => {
            if k.ct_eq(&[0u8; 32]).into() {
                OsRng.fill_bytes(k);
            }
            key.copy_from_slice(k);
        }
    }

    let m = msg.len();
    let total = padded_size(m, pad_length);
    let fill = total - PADDING_OVERHEAD - m;

    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(msg);
    out.resize(m + fill, 0);
    if fill > 0 {
        let mut cipher = ChaCha20::new((&key).into(), (&[0u8; 12]).into());
        cipher.apply_keystream(&mut out[m..m + fill]);
    }
    out.extend_from_slice(&(m as u64).to_be_bytes());
    key.zeroize();
    Ok(out)
}

/// Strip padding, returning the original message. Fails with `Size` when
/// the trailer is missing or claims a length beyond the buffer.
pub fn remove_padding(msg: &[u8]) -> Result<&[u8]> {
    if msg.len() < PADDING_OVERHEAD {
        return Err(SymmetricError::Size);
    }
    let trailer: [u8; 8] = msg[msg.len() - PADDING_OVERHEAD..]
        .try_into()
        .map_err(|_| SymmetricError::Size)?;
    let claimed = u64::from_be_bytes(trailer);
    if claimed > (msg.len() - PADDING_OVERHEAD) as u64 {
        return Err(SymmetricError::Size);
    }
    Ok(&msg[..claimed as usize])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let msg = b"this is a test message";
        let padded = add_padding(msg, 30, None).unwrap();
        assert_eq!(padded.len(), 30 + PADDING_OVERHEAD);
        assert_eq!(remove_padding(&padded).unwrap(), msg);
    }

    #[test]
    fn test_message_longer_than_pad_length() {
        let msg = [0xAAu8; 64];
        let padded = add_padding(&msg, 16, None).unwrap();
        assert_eq!(padded.len(), 64 + PADDING_OVERHEAD);
        assert_eq!(remove_padding(&padded).unwrap(), &msg);
    }

    #[test]
    fn test_empty_message() {
        let padded = add_padding(b"", 12, None).unwrap();
        assert_eq!(padded.len(), 12 + PADDING_OVERHEAD);
        assert!(remove_padding(&padded).unwrap().is_empty());
    }

    #[test]
    fn test_size_law_across_lengths() {
        for m in [0usize, 1, 7, 63, 64, 65, 512] {
            for p in [0usize, 1, 64, 512] {
                let msg = vec![0x5Au8; m];
                let padded = add_padding(&msg, p, None).unwrap();
                assert_eq!(padded.len(), m.max(p) + PADDING_OVERHEAD);
                assert_eq!(remove_padding(&padded).unwrap(), msg.as_slice());
            }
        }
    }

    #[test]
    fn test_zero_key_is_randomized_in_place() {
        let mut key = [0u8; 32];
        add_padding(b"msg", 64, Some(&mut key)).unwrap();
        assert_ne!(key, [0u8; 32]);
    }

    #[test]
    fn test_fixed_key_is_deterministic_filler() {
        let mut k1 = [9u8; 32];
        let mut k2 = [9u8; 32];
        let a = add_padding(b"msg", 64, Some(&mut k1)).unwrap();
        let b = add_padding(b"msg", 64, Some(&mut k2)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_corrupt_trailer_rejected() {
        let mut padded = add_padding(b"hello", 16, None).unwrap();
        let n = padded.len();
        padded[n - 1] = 0xFF;
        padded[n - 8] = 0xFF;
        assert_eq!(remove_padding(&padded).err(), Some(SymmetricError::Size));
        assert_eq!(remove_padding(&[0u8; 4]).err(), Some(SymmetricError::Size));
    }
}
