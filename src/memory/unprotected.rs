//! Reference engine: plain heap allocations with explicit zeroization.
//!
//! Shares the full state machine of the guarded engine so that code written
//! against it behaves identically under protection.

use rand::rngs::OsRng;
use rand::RngCore;

use super::{Cell, Engine, SecretBuffer};

/// Heap-backed memory engine.
pub struct UnprotectedEngine {
    master: Cell,
}

impl UnprotectedEngine {
    /// Engine with a caller-supplied 32-byte master cell key.
    pub fn new(master: Cell) -> UnprotectedEngine {
        UnprotectedEngine { master }
    }

    /// Engine with a fresh random master key.
    pub fn with_random_key() -> UnprotectedEngine {
        let mut master = Cell::new(32);
        OsRng.fill_bytes(master.bytes_mut());
        UnprotectedEngine { master }
    }
}

impl Engine for UnprotectedEngine {
    fn element(&self, size: usize) -> SecretBuffer {
        SecretBuffer::heap(size)
    }

    fn cell(&self, size: usize) -> Cell {
        Cell::new(size)
    }

    fn master_key(&self) -> &Cell {
        &self.master
    }
}
