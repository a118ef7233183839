//! Semaphore raise messages.
//!
//! Sent to an oracle to set a distress semaphore over a time range. A zero
//! `set_from` means "since the beginning of time", a zero `set_to` means
//! "forever".

use serde::{Deserialize, Serialize};

use super::wire::{Reader, WireError, Writer};
use super::SET_SEMAPHORE_MSG_TYPE_ID;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetSemaphoreMsg {
    pub set_from: i64,
    pub set_to: i64,
    pub name: [u8; 32],
}

impl SetSemaphoreMsg {
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        let mut w = Writer::new(SET_SEMAPHORE_MSG_TYPE_ID);
        w.put_i64(self.set_from);
        w.put_i64(self.set_to);
        w.put_array32(&self.name);
        Ok(w.finish())
    }

    pub fn decode(d: &[u8]) -> Result<SetSemaphoreMsg, WireError> {
        let mut r = Reader::new(d, SET_SEMAPHORE_MSG_TYPE_ID)?;
        let set_from = r.i64()?;
        let set_to = r.i64()?;
        let name = r.array32()?;
        r.finish()?;
        Ok(SetSemaphoreMsg {
            set_from,
            set_to,
            name,
        })
    }
}
