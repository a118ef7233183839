//! HMAC-SHA256 secret combiner.
//!
//! The hybrid layer folds a sequence of DH outputs into one symmetric key
//! by iterating `state = HMAC(state, secret)`. The combiner allocates its
//! outputs from a memory engine so intermediate states live in protected
//! cells. Inputs are never mutated.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::memory::{Cell, EngineRef};

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 of `msg` under `key`, written into `out[..32]`.
pub fn hmac_sha256(key: &[u8], msg: &[u8], out: &mut [u8]) {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key).expect("hmac accepts any key length");
    mac.update(msg);
    out[..32].copy_from_slice(&mac.finalize().into_bytes());
}

/// Combines two secrets into one 32-byte cell.
pub struct SecretCombiner {
    engine: EngineRef,
}

impl SecretCombiner {
    pub fn new(engine: EngineRef) -> SecretCombiner {
        SecretCombiner { engine }
    }

    /// `HMAC-SHA256(key, msg)` in a fresh cell from the combiner's engine.
    pub fn combine(&self, key: &[u8], msg: &[u8]) -> Cell {
        let mut out = self.engine.cell(32);
        hmac_sha256(key, msg, out.bytes_mut());
        out
    }
}
