//! Tagged type registry for at-rest encodings.
//!
//! Wire contract: `version i32 BE | type_id i32 BE | payload`, where the
//! payload is the bincode encoding (big-endian, fixed-width integers) of
//! the registered type. Types register a decoder under their TypeID at
//! startup; unknown or invalid tags and trailing payload bytes are
//! rejected.

use std::collections::HashMap;
use std::sync::Mutex;

use bincode::Options;
use once_cell::sync::Lazy;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::wire::WireError;
use super::{
    OracleMessage, OracleMessageContainer, SetSemaphoreMsg, ShareMsg,
    ORACLE_MSG_CONTAINER_TYPE_ID, ORACLE_MSG_TYPE_ID, SET_SEMAPHORE_MSG_TYPE_ID,
    SHARE_MSG_TYPE_ID,
};

/// Encoding version emitted in every frame.
pub const WIRE_VERSION: i32 = 1_000_000_001;

pub type Result<T> = std::result::Result<T, WireError>;

/// A decoded registry object.
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    SetSemaphore(SetSemaphoreMsg),
    Share(ShareMsg),
    Container(OracleMessageContainer),
    Oracle(OracleMessage),
}

impl Message {
    fn type_id(&self) -> i32 {
        match self {
            Message::SetSemaphore(_) => SET_SEMAPHORE_MSG_TYPE_ID as i32,
            Message::Share(_) => SHARE_MSG_TYPE_ID as i32,
            Message::Container(_) => ORACLE_MSG_CONTAINER_TYPE_ID as i32,
            Message::Oracle(_) => ORACLE_MSG_TYPE_ID as i32,
        }
    }
}

type DecodeFn = fn(&[u8]) -> Result<Message>;

static REGISTRY: Lazy<Mutex<HashMap<i32, DecodeFn>>> = Lazy::new(|| {
    let mut m: HashMap<i32, DecodeFn> = HashMap::new();
    m.insert(SET_SEMAPHORE_MSG_TYPE_ID as i32, decode_set_semaphore);
    m.insert(SHARE_MSG_TYPE_ID as i32, decode_share);
    m.insert(ORACLE_MSG_CONTAINER_TYPE_ID as i32, decode_container);
    m.insert(ORACLE_MSG_TYPE_ID as i32, decode_oracle);
    Mutex::new(m)
});

fn options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_big_endian()
        .with_fixint_encoding()
}

fn decode_payload<T: DeserializeOwned>(d: &[u8]) -> Result<T> {
    let mut slice = d;
    let v = options()
        .allow_trailing_bytes()
        .deserialize_from(&mut slice)
        .map_err(|_| WireError::Encoding)?;
    if !slice.is_empty() {
        return Err(WireError::ExtraBytes);
    }
    Ok(v)
}

fn decode_set_semaphore(d: &[u8]) -> Result<Message> {
    Ok(Message::SetSemaphore(decode_payload(d)?))
}

fn decode_share(d: &[u8]) -> Result<Message> {
    Ok(Message::Share(decode_payload(d)?))
}

fn decode_container(d: &[u8]) -> Result<Message> {
    Ok(Message::Container(decode_payload(d)?))
}

fn decode_oracle(d: &[u8]) -> Result<Message> {
    Ok(Message::Oracle(decode_payload(d)?))
}

/// Register an additional decoder. Contract: the TypeID must be positive
/// and unused.
pub fn register(type_id: i32, decode: DecodeFn) {
    assert!(type_id > 0, "registry type id must be positive");
    let mut registry = REGISTRY.lock().expect("type registry lock poisoned");
    let previous = registry.insert(type_id, decode);
    assert!(previous.is_none(), "duplicate registry type id {type_id}");
}

fn encode_payload<T: Serialize>(v: &T) -> Result<Vec<u8>> {
    options().serialize(v).map_err(|_| WireError::Encoding)
}

/// Encode a registered object into a version/type tagged frame.
pub fn marshal(msg: &Message) -> Result<Vec<u8>> {
    let payload = match msg {
        Message::SetSemaphore(v) => encode_payload(v)?,
        Message::Share(v) => encode_payload(v)?,
        Message::Container(v) => encode_payload(v)?,
        Message::Oracle(v) => encode_payload(v)?,
    };
    let mut out = Vec::with_capacity(8 + payload.len());
    out.extend_from_slice(&WIRE_VERSION.to_be_bytes());
    out.extend_from_slice(&msg.type_id().to_be_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

/// Decode a tagged frame into a registered object.
pub fn unmarshal(d: &[u8]) -> Result<Message> {
    if d.len() < 8 {
        return Err(WireError::Encoding);
    }
    let version = i32::from_be_bytes([d[0], d[1], d[2], d[3]]);
    if version != WIRE_VERSION {
        return Err(WireError::Encoding);
    }
    let type_id = i32::from_be_bytes([d[4], d[5], d[6], d[7]]);
    if type_id <= 0 {
        return Err(WireError::TypeIDInvalid);
    }
    let decode = {
        let registry = REGISTRY.lock().expect("type registry lock poisoned");
        registry.get(&type_id).copied()
    };
    match decode {
        Some(f) => f(&d[8..]),
        None => Err(WireError::TypeUnknown),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_all_builtin_types() {
        let msgs = [
            Message::SetSemaphore(SetSemaphoreMsg {
                set_from: 1,
                set_to: 2,
                name: [3; 32],
            }),
            Message::Share(ShareMsg {
                share: b"share".to_vec(),
                oracle_key: [4; 32],
            }),
            Message::Container(OracleMessageContainer {
                valid_from: 5,
                valid_to: 6,
                share_threshold: 7,
                oracle_long_term_key: [8; 32],
                response_public_key: [9; 32],
                response_private_key: vec![10; 32],
                share_msg_key: vec![11; 32],
                oracle_url: b"url".to_vec(),
                oracle_message: vec![12; 16],
            }),
            Message::Oracle(OracleMessage {
                oracle_url: b"url".to_vec(),
                long_term_oracle_public_key: [13; 32],
                timelock_public_key: [14; 32],
                test_semaphores: [[15; 32], [0; 32], [16; 32]],
                set_semaphores: [[17; 32], [18; 32], [0; 32]],
                valid_from: 19,
                valid_to: 20,
                response_public_key: [21; 32],
                share: vec![22; 8],
                share_threshold: 23,
            }),
        ];
        for m in msgs {
            let d = marshal(&m).unwrap();
            assert_eq!(unmarshal(&d).unwrap(), m);
        }
    }

    #[test]
    fn test_unknown_type_rejected() {
        let mut d = WIRE_VERSION.to_be_bytes().to_vec();
        d.extend_from_slice(&4242i32.to_be_bytes());
        assert_eq!(unmarshal(&d).err(), Some(WireError::TypeUnknown));
    }

    #[test]
    fn test_invalid_type_id_rejected() {
        let mut d = WIRE_VERSION.to_be_bytes().to_vec();
        d.extend_from_slice(&(-7i32).to_be_bytes());
        assert_eq!(unmarshal(&d).err(), Some(WireError::TypeIDInvalid));
        let mut d = WIRE_VERSION.to_be_bytes().to_vec();
        d.extend_from_slice(&0i32.to_be_bytes());
        assert_eq!(unmarshal(&d).err(), Some(WireError::TypeIDInvalid));
    }

    #[test]
    fn test_version_and_frame_errors() {
        assert_eq!(unmarshal(&[0u8; 4]).err(), Some(WireError::Encoding));
        let m = Message::SetSemaphore(SetSemaphoreMsg {
            set_from: 0,
            set_to: 0,
            name: [0; 32],
        });
        let mut d = marshal(&m).unwrap();
        d[3] ^= 0x01; // break the version
        assert_eq!(unmarshal(&d).err(), Some(WireError::Encoding));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let m = Message::SetSemaphore(SetSemaphoreMsg {
            set_from: 0,
            set_to: 0,
            name: [0; 32],
        });
        let mut d = marshal(&m).unwrap();
        d.push(0xFF);
        assert_eq!(unmarshal(&d).err(), Some(WireError::ExtraBytes));
    }
}
