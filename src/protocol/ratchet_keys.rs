//! Published ratchet public key lists.
//!
//! An oracle publishes `(start_time, ratchet_time, [pub₀ … pubₙ₋₁])`;
//! clients pick the key covering a chosen future timestamp.

use serde::{Deserialize, Serialize};

/// A list of consecutive ratchet public keys with their slot parameters.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatchetPublicKeyList {
    pub start_time: i64,
    pub ratchet_time: i64,
    pub keys: Vec<[u8; 32]>,
}

/// One ratchet public key with its validity window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeKey {
    pub valid_from: i64,
    pub valid_to: i64,
    pub public_key: [u8; 32],
}

impl RatchetPublicKeyList {
    /// The key covering timestamp `time`, or `None` when the list does not
    /// reach that far.
    pub fn select_key(&self, time: i64) -> Option<TimeKey> {
        if self.ratchet_time <= 0 || time < self.start_time {
            return None;
        }
        let pos = ((time - self.start_time) / self.ratchet_time) as usize;
        let public_key = *self.keys.get(pos)?;
        let valid_from = self.start_time + pos as i64 * self.ratchet_time;
        Some(TimeKey {
            valid_from,
            valid_to: valid_from + self.ratchet_time - 1,
            public_key,
        })
    }

    /// Align a timestamp down to its slot boundary.
    fn align(&self, time: i64) -> i64 {
        (time - self.start_time) / self.ratchet_time * self.ratchet_time + self.start_time
    }

    /// All keys covering `[begin, end]`, endpoints aligned down to slot
    /// boundaries. Empty when the range is invalid or precedes the list.
    pub fn select_key_range(&self, begin: i64, end: i64) -> Vec<TimeKey> {
        if self.ratchet_time <= 0 || begin > end || begin < self.start_time {
            return Vec::new();
        }
        let begin = self.align(begin);
        let end = self.align(end);
        let mut out = Vec::with_capacity(((end - begin) / self.ratchet_time + 1) as usize);
        let mut t = begin;
        while t <= end {
            if let Some(k) = self.select_key(t) {
                out.push(k);
            }
            t += self.ratchet_time;
        }
        out
    }
}
