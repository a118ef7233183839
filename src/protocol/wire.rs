//! Tag-prefixed binary field codec.
//!
//! Every top-level object starts with its 2-byte big-endian TypeID;
//! decoders verify the tag before touching the payload. Integers are
//! big-endian; byte-slice fields carry a 2-byte length prefix; 32-byte key
//! fields are literal. There are no variable-length integer schemes.

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum WireError {
    #[error("unexpected wire tag")]
    MessageType,
    #[error("truncated input")]
    Size,
    #[error("trailing bytes after message")]
    ExtraBytes,
    #[error("encoding error")]
    Encoding,
    #[error("unknown type")]
    TypeUnknown,
    #[error("invalid type id")]
    TypeIDInvalid,
    #[error("field exceeds wire bounds")]
    BufferSize,
}

pub type Result<T> = std::result::Result<T, WireError>;

/// Message writer. Emits the type tag on construction.
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new(type_id: u16) -> Writer {
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(&type_id.to_be_bytes());
        Writer { buf }
    }

    pub fn put_i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn put_array32(&mut self, v: &[u8; 32]) {
        self.buf.extend_from_slice(v);
    }

    /// Length-prefixed byte field. Fields longer than `u16::MAX` do not
    /// fit the wire.
    pub fn put_bytes(&mut self, v: &[u8]) -> Result<()> {
        let len = u16::try_from(v.len()).map_err(|_| WireError::BufferSize)?;
        self.buf.extend_from_slice(&len.to_be_bytes());
        self.buf.extend_from_slice(v);
        Ok(())
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Message reader. Verifies the type tag on construction.
pub struct Reader<'a> {
    d: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(d: &'a [u8], expect_type: u16) -> Result<Reader<'a>> {
        if d.len() < 2 {
            return Err(WireError::Size);
        }
        if u16::from_be_bytes([d[0], d[1]]) != expect_type {
            return Err(WireError::MessageType);
        }
        Ok(Reader { d, pos: 2 })
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.d.len() - self.pos < n {
            return Err(WireError::Size);
        }
        let out = &self.d[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn i32(&mut self) -> Result<i32> {
        let b = self.take(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn i64(&mut self) -> Result<i64> {
        let b = self.take(8)?;
        let mut v = [0u8; 8];
        v.copy_from_slice(b);
        Ok(i64::from_be_bytes(v))
    }

    pub fn array32(&mut self) -> Result<[u8; 32]> {
        let b = self.take(32)?;
        let mut v = [0u8; 32];
        v.copy_from_slice(b);
        Ok(v)
    }

    pub fn bytes(&mut self) -> Result<&'a [u8]> {
        let b = self.take(2)?;
        let len = u16::from_be_bytes([b[0], b[1]]) as usize;
        self.take(len)
    }

    /// The decode must have consumed the whole input.
    pub fn finish(&self) -> Result<()> {
        if self.pos != self.d.len() {
            return Err(WireError::ExtraBytes);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let mut w = Writer::new(0x1234);
        w.put_i64(-5);
        w.put_i32(77);
        w.put_array32(&[9u8; 32]);
        w.put_bytes(b"hello").unwrap();
        let d = w.finish();

        let mut r = Reader::new(&d, 0x1234).unwrap();
        assert_eq!(r.i64().unwrap(), -5);
        assert_eq!(r.i32().unwrap(), 77);
        assert_eq!(r.array32().unwrap(), [9u8; 32]);
        assert_eq!(r.bytes().unwrap(), b"hello");
        r.finish().unwrap();
    }

    #[test]
    fn test_tag_mismatch() {
        let d = Writer::new(100).finish();
        assert_eq!(Reader::new(&d, 101).err(), Some(WireError::MessageType));
        assert_eq!(Reader::new(&[0x01], 1).err(), Some(WireError::Size));
    }

    #[test]
    fn test_truncation_and_residue() {
        let mut w = Writer::new(1);
        w.put_bytes(b"abc").unwrap();
        let d = w.finish();

        let mut r = Reader::new(&d[..4], 1).unwrap();
        assert_eq!(r.bytes().err(), Some(WireError::Size));

        let mut r = Reader::new(&d, 1).unwrap();
        r.bytes().unwrap();
        r.finish().unwrap();

        let mut extra = d.clone();
        extra.push(0);
        let mut r = Reader::new(&extra, 1).unwrap();
        r.bytes().unwrap();
        assert_eq!(r.finish().err(), Some(WireError::ExtraBytes));
    }
}
