//! Term encoder.

use bytes::{BufMut, Bytes, BytesMut};

use crate::term::{MAX_FIXED_INTEGER, TermError, tags};

/// Growable buffer that terms are appended to.
///
/// Elements of a tuple or list are written in order after their header; the
/// writer does not track nesting, the caller does.
#[derive(Debug, Default)]
pub struct TermWriter {
    buf: BytesMut,
}

impl TermWriter {
    /// Create an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a writer with room for `capacity` bytes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
        }
    }

    /// Write the version tag that precedes a top-level term.
    pub fn version(&mut self) {
        self.buf.put_u8(tags::VERSION);
    }

    /// Write a tuple header. All tuples this crate writes are small.
    pub fn tuple_header(&mut self, arity: u8) {
        self.buf.put_u8(tags::SMALL_TUPLE);
        self.buf.put_u8(arity);
    }

    /// Write an atom.
    pub fn atom(&mut self, name: &str) -> Result<(), TermError> {
        let len = u16::try_from(name.len()).map_err(|_| TermError::TooLarge { len: name.len() })?;
        self.buf.put_u8(tags::ATOM);
        self.buf.put_u16(len);
        self.buf.put_slice(name.as_bytes());
        Ok(())
    }

    /// Write a list header for `len` elements.
    ///
    /// A zero-length list is written as nil, and must not be followed by a
    /// second nil.
    pub fn list_header(&mut self, len: usize) -> Result<(), TermError> {
        if len == 0 {
            self.nil();
            return Ok(());
        }
        let len32 = u32::try_from(len).map_err(|_| TermError::TooLarge { len })?;
        self.buf.put_u8(tags::LIST);
        self.buf.put_u32(len32);
        Ok(())
    }

    /// Write nil, the empty list (also the tail of a proper list).
    pub fn nil(&mut self) {
        self.buf.put_u8(tags::NIL);
    }

    /// Write an unsigned integer in its shortest representation.
    #[allow(clippy::cast_possible_truncation)] // both narrowing casts are range-checked
    pub fn u64(&mut self, value: u64) {
        if let Ok(small) = u8::try_from(value) {
            self.buf.put_u8(tags::SMALL_INTEGER);
            self.buf.put_u8(small);
        } else if value <= MAX_FIXED_INTEGER {
            self.buf.put_u8(tags::INTEGER);
            self.buf.put_u32(value as u32);
        } else {
            let digits = value.to_le_bytes();
            let count = digits.len() - (value.leading_zeros() / 8) as usize;
            self.buf.put_u8(tags::SMALL_BIG);
            self.buf.put_u8(count as u8);
            self.buf.put_u8(0);
            self.buf.put_slice(&digits[..count]);
        }
    }

    /// Write an opaque binary.
    pub fn binary(&mut self, bytes: &[u8]) -> Result<(), TermError> {
        let len = u32::try_from(bytes.len()).map_err(|_| TermError::TooLarge { len: bytes.len() })?;
        self.buf.put_u8(tags::BINARY);
        self.buf.put_u32(len);
        self.buf.put_slice(bytes);
        Ok(())
    }

    /// Append bytes that are already an encoded term.
    pub fn raw(&mut self, encoded: &[u8]) {
        self.buf.put_slice(encoded);
    }

    /// Finish writing and hand out the encoded bytes.
    #[must_use]
    pub fn finish(self) -> Bytes {
        self.buf.freeze()
    }
}

/// Encode a single unsigned integer term (no version tag).
#[must_use]
pub fn encode_u64(value: u64) -> Bytes {
    let mut writer = TermWriter::with_capacity(11);
    writer.u64(value);
    writer.finish()
}

/// Encode a single binary term (no version tag).
pub fn encode_binary(bytes: &[u8]) -> Result<Bytes, TermError> {
    let mut writer = TermWriter::with_capacity(bytes.len() + 5);
    writer.binary(bytes)?;
    Ok(writer.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_integer() {
        assert_eq!(encode_u64(0).as_ref(), &[97, 0]);
        assert_eq!(encode_u64(255).as_ref(), &[97, 255]);
    }

    #[test]
    fn test_fixed_integer() {
        assert_eq!(encode_u64(256).as_ref(), &[98, 0, 0, 1, 0]);
        assert_eq!(
            encode_u64(MAX_FIXED_INTEGER).as_ref(),
            &[98, 0x07, 0xFF, 0xFF, 0xFF]
        );
    }

    #[test]
    fn test_big_integer() {
        // First value past the fixed range needs 4 little-endian digits.
        assert_eq!(
            encode_u64(MAX_FIXED_INTEGER + 1).as_ref(),
            &[110, 4, 0, 0, 0, 0, 0x08]
        );
        let max = encode_u64(u64::MAX);
        assert_eq!(max.len(), 11);
        assert_eq!(&max[..3], &[110, 8, 0]);
        assert!(max[3..].iter().all(|b| *b == 0xFF));
    }

    #[test]
    fn test_binary() {
        let encoded = encode_binary(b"abc").expect("encode");
        assert_eq!(encoded.as_ref(), &[109, 0, 0, 0, 3, b'a', b'b', b'c']);
    }

    #[test]
    fn test_atom_and_tuple() {
        let mut writer = TermWriter::new();
        writer.version();
        writer.tuple_header(2);
        writer.atom("kv_node").expect("atom");
        writer.list_header(0).expect("list");
        let bytes = writer.finish();
        assert_eq!(
            bytes.as_ref(),
            &[131, 104, 2, 100, 0, 7, b'k', b'v', b'_', b'n', b'o', b'd', b'e', 106]
        );
    }

    #[test]
    fn test_list_header() {
        let mut writer = TermWriter::new();
        writer.list_header(3).expect("list");
        assert_eq!(writer.finish().as_ref(), &[108, 0, 0, 0, 3]);
    }
}
