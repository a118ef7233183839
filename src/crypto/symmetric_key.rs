//! Random symmetric key held in a sealed element.

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use super::{KeyError, Result};
use crate::memory::{EngineRef, SecretBuffer};

/// A 32-byte symmetric key, sealed between uses. Used for the share
/// message keys stored inside oracle message containers.
pub struct SymmetricKey {
    element: SecretBuffer,
}

impl SymmetricKey {
    pub fn generate(engine: &EngineRef) -> Result<SymmetricKey> {
        let element = engine.element(32);
        element.with_bytes(|b| {
            OsRng.fill_bytes(b);
            Ok::<(), KeyError>(())
        })?;
        Ok(SymmetricKey { element })
    }

    /// Run `f` with the key bytes; reseals afterwards.
    pub fn with_key<R, E, F>(&self, f: F) -> std::result::Result<R, E>
    where
        F: FnOnce(&[u8]) -> std::result::Result<R, E>,
        E: From<crate::memory::MemoryError>,
    {
        self.element.with_bytes(|b| f(b))
    }

    /// Copy the key out, e.g. for storage inside an encrypted container.
    pub fn export(&self) -> Result<Zeroizing<Vec<u8>>> {
        self.element
            .with_bytes(|b| Ok::<_, KeyError>(Zeroizing::new(b.to_vec())))
    }

    pub fn destroy(&self) {
        self.element.destroy();
    }
}
