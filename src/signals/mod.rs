//! Distress signal store interface and reference implementation.
//!
//! A signal is a named flag covering a time range. `set_signal` merges
//! with any existing entry so a recorded distress range can only ever
//! grow; `test_signal` answers whether the caller may proceed, i.e.
//! whether the signal does NOT cover the current time. A zero `from`
//! means "since the beginning of time", a zero `to` means "forever".
//!
//! Durable storage is external; [`MemorySignalStore`] is the in-process
//! reference implementation oracles use directly and tests drive.

use std::collections::BTreeMap;
use std::sync::Mutex;

use thiserror::Error;

use crate::clock::Clock;

#[derive(Error, Debug)]
pub enum SignalError {
    #[error("signal store failure: {0}")]
    Store(String),
}

pub type Result<T> = std::result::Result<T, SignalError>;

/// Durable named-flag store with time-range merge semantics.
pub trait SignalStore: Send + Sync {
    /// Record `name` as set over `[from, to]`, merging with any existing
    /// range: the stored range only ever widens.
    fn set_signal(&self, name: &[u8], from: i64, to: i64) -> Result<()>;

    /// True iff the signal is currently UNSET and the protected operation
    /// may proceed.
    fn test_signal(&self, name: &[u8]) -> bool;
}

/// Encode a time range as two big-endian i64 values.
pub fn encode_times(set_from: i64, set_to: i64) -> [u8; 16] {
    let mut out = [0u8; 16];
    out[..8].copy_from_slice(&set_from.to_be_bytes());
    out[8..].copy_from_slice(&set_to.to_be_bytes());
    out
}

/// Decode a stored time range. Corrupted or short values decode as
/// `(0, 0)` — permanently set — so damage fails closed.
pub fn decode_times(d: &[u8]) -> (i64, i64) {
    if d.len() < 16 {
        return (0, 0);
    }
    let mut from = [0u8; 8];
    let mut to = [0u8; 8];
    from.copy_from_slice(&d[..8]);
    to.copy_from_slice(&d[8..16]);
    (i64::from_be_bytes(from), i64::from_be_bytes(to))
}

/// True iff `now` lies within `[set_from, set_to)`, where a zero bound
/// extends to infinity on its side.
pub fn is_signal_time_set(set_from: i64, set_to: i64, now: i64) -> bool {
    set_from <= now && (set_to == 0 || set_to > now)
}

/// Maximum of two "to" bounds, where zero beats everything.
fn max_time(a: i64, b: i64) -> i64 {
    if a == 0 || b == 0 {
        return 0;
    }
    a.max(b)
}

/// Merge a new range into an existing one. Returns the widened range and
/// whether anything changed.
pub fn merge_times(
    old_from: i64,
    old_to: i64,
    new_from: i64,
    new_to: i64,
) -> (i64, i64, bool) {
    let from = old_from.min(new_from);
    let to = max_time(old_to, new_to);
    (from, to, from != old_from || to != old_to)
}

/// Ordered in-memory signal store.
pub struct MemorySignalStore {
    clock: Clock,
    entries: Mutex<BTreeMap<Vec<u8>, (i64, i64)>>,
}

impl MemorySignalStore {
    pub fn new(clock: Clock) -> MemorySignalStore {
        MemorySignalStore {
            clock,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    /// Number of recorded signals.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `name` has ever been recorded, regardless of range.
    pub fn contains(&self, name: &[u8]) -> bool {
        self.lock().contains_key(name)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<Vec<u8>, (i64, i64)>> {
        self.entries.lock().expect("signal store lock poisoned")
    }
}

impl SignalStore for MemorySignalStore {
    fn set_signal(&self, name: &[u8], from: i64, to: i64) -> Result<()> {
        let mut entries = self.lock();
        match entries.get_mut(name) {
            Some((old_from, old_to)) => {
                let (merged_from, merged_to, changed) =
                    merge_times(*old_from, *old_to, from, to);
                if changed {
                    *old_from = merged_from;
                    *old_to = merged_to;
                }
            }
            None => {
                entries.insert(name.to_vec(), (from, to));
            }
        }
        Ok(())
    }

    fn test_signal(&self, name: &[u8]) -> bool {
        let entries = self.lock();
        match entries.get(name) {
            None => true,
            Some((from, to)) => !is_signal_time_set(*from, *to, self.clock.now()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Arc;

    fn store_at(time: Arc<AtomicI64>) -> MemorySignalStore {
        let t = time;
        MemorySignalStore::new(Clock::from_fn(move || t.load(Ordering::SeqCst)))
    }

    #[test]
    fn test_set_and_test() {
        let store = store_at(Arc::new(AtomicI64::new(100)));
        assert!(store.test_signal(b"signal 1"));
        store.set_signal(b"signal 1", 0, 0).unwrap();
        assert!(store.test_signal(b"signal 2"));
        assert!(!store.test_signal(b"signal 1"));
        // Duplicate set is fine.
        store.set_signal(b"signal 1", 0, 0).unwrap();
        assert!(!store.test_signal(b"signal 1"));
    }

    #[test]
    fn test_time_range_merge() {
        let time = Arc::new(AtomicI64::new(0));
        let store = store_at(time.clone());
        store.set_signal(b"s", 10, 11).unwrap();

        time.store(10, Ordering::SeqCst);
        assert!(!store.test_signal(b"s"));
        time.store(9, Ordering::SeqCst);
        assert!(store.test_signal(b"s"));
        time.store(11, Ordering::SeqCst);
        assert!(store.test_signal(b"s"));

        store.set_signal(b"s", 9, 0).unwrap();
        time.store(9, Ordering::SeqCst);
        assert!(!store.test_signal(b"s"));
        time.store(i64::MAX, Ordering::SeqCst);
        assert!(!store.test_signal(b"s"));
        time.store(8, Ordering::SeqCst);
        assert!(store.test_signal(b"s"));
    }

    #[test]
    fn test_is_signal_time_set_table() {
        let now = 10;
        assert!(is_signal_time_set(0, 0, now));
        assert!(is_signal_time_set(1, 11, now));
        assert!(is_signal_time_set(10, 11, now));
        assert!(is_signal_time_set(0, 11, now));
        assert!(!is_signal_time_set(0, 10, now));
        assert!(!is_signal_time_set(1, 10, now));
        assert!(!is_signal_time_set(11, 11, now));
        assert!(!is_signal_time_set(11, 12, now));
        assert!(!is_signal_time_set(11, 0, now));
    }

    #[test]
    fn test_times_codec() {
        for (a, b) in [(0, i64::MAX), (i64::MAX, 0), (i64::MAX, i64::MAX), (0, 0), (1, 1)] {
            assert_eq!(decode_times(&encode_times(a, b)), (a, b));
        }
        // Corrupt data fails closed.
        assert_eq!(decode_times(&[1, 2, 3]), (0, 0));
    }

    #[test]
    fn test_merge_times() {
        assert_eq!(merge_times(10, 11, 9, 0), (9, 0, true));
        assert_eq!(merge_times(10, 11, 10, 11), (10, 11, false));
        assert_eq!(merge_times(10, 11, 12, 13), (10, 13, true));
        assert_eq!(merge_times(0, 5, 3, 4), (0, 5, false));
    }
}
