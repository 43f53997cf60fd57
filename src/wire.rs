//! Byte-level reader and writer shared by the payload and predicate formats
//!
//! Integers that carry lengths or counts are protobuf varints; byte sequences
//! and strings are varint-length-prefixed; nullable byte sequences carry a
//! presence byte first.

use prost::encoding::{decode_varint, encode_varint};

use crate::error::{FilterError, Result};

#[derive(Debug, Default)]
pub(crate) struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn put_bool(&mut self, value: bool) {
        self.buf.push(u8::from(value));
    }

    pub fn put_varint(&mut self, value: u64) {
        encode_varint(value, &mut self.buf);
    }

    pub fn put_bytes(&mut self, value: &[u8]) {
        self.put_varint(value.len() as u64);
        self.buf.extend_from_slice(value);
    }

    pub fn put_nullable(&mut self, value: Option<&[u8]>) {
        match value {
            Some(bytes) => {
                self.put_bool(true);
                self.put_bytes(bytes);
            }
            None => self.put_bool(false),
        }
    }

    pub fn put_str(&mut self, value: &str) {
        self.put_bytes(value.as_bytes());
    }

    pub fn put_u128(&mut self, value: u128) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

#[derive(Debug)]
pub(crate) struct WireReader<'a> {
    buf: &'a [u8],
}

impl<'a> WireReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.buf.len()
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8]> {
        if needed > self.buf.len() {
            return Err(FilterError::Truncated {
                needed,
                available: self.buf.len(),
            });
        }
        let (head, tail) = self.buf.split_at(needed);
        self.buf = tail;
        Ok(head)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(FilterError::malformed(format!("invalid bool byte {other}"))),
        }
    }

    pub fn read_varint(&mut self) -> Result<u64> {
        Ok(decode_varint(&mut self.buf)?)
    }

    /// Read a count or length, bounded by what is left in the buffer
    pub fn read_len(&mut self) -> Result<usize> {
        let len = self.read_varint()?;
        usize::try_from(len)
            .ok()
            .filter(|len| *len <= self.buf.len())
            .ok_or(FilterError::Truncated {
                needed: usize::try_from(len).unwrap_or(usize::MAX),
                available: self.buf.len(),
            })
    }

    pub fn read_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.read_len()?;
        self.take(len)
    }

    pub fn read_nullable(&mut self) -> Result<Option<&'a [u8]>> {
        if self.read_bool()? {
            self.read_bytes().map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_bytes()?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| FilterError::malformed(format!("invalid UTF-8 string: {e}")))
    }

    pub fn read_u128(&mut self) -> Result<u128> {
        let bytes = self.take(16)?;
        let mut raw = [0u8; 16];
        raw.copy_from_slice(bytes);
        Ok(u128::from_be_bytes(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mixed_fields_read_back_in_order() {
        let mut writer = WireWriter::new();
        writer.put_u8(7);
        writer.put_bool(true);
        writer.put_varint(300);
        writer.put_str("example.Foo");
        writer.put_nullable(None);
        writer.put_nullable(Some(b"abc"));
        writer.put_u128(u128::MAX - 1);
        let bytes = writer.into_inner();

        let mut reader = WireReader::new(&bytes);
        assert_eq!(reader.read_u8().unwrap(), 7);
        assert!(reader.read_bool().unwrap());
        assert_eq!(reader.read_varint().unwrap(), 300);
        assert_eq!(reader.read_string().unwrap(), "example.Foo");
        assert_eq!(reader.read_nullable().unwrap(), None);
        assert_eq!(reader.read_nullable().unwrap(), Some(&b"abc"[..]));
        assert_eq!(reader.read_u128().unwrap(), u128::MAX - 1);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_length_past_end_is_truncated() {
        let mut writer = WireWriter::new();
        writer.put_varint(10);
        writer.put_u8(1);
        let bytes = writer.into_inner();

        let err = WireReader::new(&bytes).read_bytes().unwrap_err();
        assert!(matches!(err, FilterError::Truncated { needed: 10, available: 1 }));
    }

    #[test]
    fn test_invalid_bool_is_malformed() {
        let err = WireReader::new(&[2]).read_bool().unwrap_err();
        assert!(matches!(err, FilterError::MalformedPayload(_)));
    }
}
