//! Constant-time comparison for key material.
//! Every comparison that gates key selection or response-key verification
//! goes through these helpers.

use subtle::ConstantTimeEq;

/// Constant-time equality for 32-byte values (public keys, semaphores).
#[inline(always)]
pub fn eq_32(a: &[u8; 32], b: &[u8; 32]) -> bool {
    a.ct_eq(b).into()
}

/// Constant-time equality for slices. Length mismatch returns early; the
/// lengths themselves are not secret.
#[inline(always)]
pub fn eq_slices(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    bool::from(diff.ct_eq(&0u8))
}
