//! Document metadata as stored in the two primary indexes.
//!
//! The same metadata is written twice per document, once keyed by sequence
//! number and once keyed by id. The value layouts are:
//!
//! ```text
//! by-seq  key: seq          value: {id, {rev_seq, rev_meta}, body_offset, deleted, content_meta, size}
//! by-id   key: id           value: {seq, {rev_seq, rev_meta}, body_offset, deleted, content_meta, size}
//! ```
//!
//! `id` and `rev_meta` are binaries, everything else is an unsigned integer.

use bytes::Bytes;

use crate::term::{TermError, TermReader, TermWriter, encode_binary, encode_u64};

/// Index metadata for one document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DocInfo {
    /// Document id.
    pub id: Bytes,
    /// Sequence number of the last update.
    pub db_seq: u64,
    /// Revision sequence.
    pub rev_seq: u64,
    /// Opaque revision metadata.
    pub rev_meta: Bytes,
    /// Offset of the document body chunk.
    pub body_offset: u64,
    /// Whether this is a deletion tombstone.
    pub deleted: bool,
    /// Content metadata flags, opaque to the compactor.
    pub content_meta: u8,
    /// Size of the document body in bytes.
    pub size: u32,
}

impl DocInfo {
    /// Encoded key for the by-sequence index.
    #[must_use]
    pub fn seq_key(&self) -> Bytes {
        encode_u64(self.db_seq)
    }

    /// Encoded value for the by-sequence index.
    pub fn seq_value(&self) -> Result<Bytes, TermError> {
        let mut writer = TermWriter::with_capacity(self.id.len() + self.rev_meta.len() + 48);
        writer.tuple_header(6);
        writer.binary(&self.id)?;
        self.write_common(&mut writer)?;
        Ok(writer.finish())
    }

    /// Encoded key for the by-id index.
    pub fn id_key(&self) -> Result<Bytes, TermError> {
        encode_binary(&self.id)
    }

    /// Encoded value for the by-id index.
    pub fn id_value(&self) -> Result<Bytes, TermError> {
        let mut writer = TermWriter::with_capacity(self.rev_meta.len() + 48);
        writer.tuple_header(6);
        writer.u64(self.db_seq);
        self.write_common(&mut writer)?;
        Ok(writer.finish())
    }

    fn write_common(&self, writer: &mut TermWriter) -> Result<(), TermError> {
        writer.tuple_header(2);
        writer.u64(self.rev_seq);
        writer.binary(&self.rev_meta)?;
        writer.u64(self.body_offset);
        writer.u64(u64::from(self.deleted));
        writer.u64(u64::from(self.content_meta));
        writer.u64(u64::from(self.size));
        Ok(())
    }

    /// Decode a by-sequence index entry.
    pub fn from_seq_entry(key: &[u8], value: &[u8]) -> Result<Self, TermError> {
        let mut reader = TermReader::new(key);
        let db_seq = reader.u64()?;
        reader.finish()?;

        let mut reader = TermReader::new(value);
        reader.tuple_of(6)?;
        let id = Bytes::copy_from_slice(reader.binary()?);
        let mut info = Self::read_common(&mut reader)?;
        reader.finish()?;

        info.id = id;
        info.db_seq = db_seq;
        Ok(info)
    }

    /// Decode a by-id index entry.
    pub fn from_id_entry(key: &[u8], value: &[u8]) -> Result<Self, TermError> {
        let mut reader = TermReader::new(key);
        let id = Bytes::copy_from_slice(reader.binary()?);
        reader.finish()?;

        let mut reader = TermReader::new(value);
        reader.tuple_of(6)?;
        let db_seq = reader.u64()?;
        let mut info = Self::read_common(&mut reader)?;
        reader.finish()?;

        info.id = id;
        info.db_seq = db_seq;
        Ok(info)
    }

    fn read_common(reader: &mut TermReader<'_>) -> Result<Self, TermError> {
        reader.tuple_of(2)?;
        let rev_seq = reader.u64()?;
        let rev_meta = Bytes::copy_from_slice(reader.binary()?);
        let body_offset = reader.u64()?;

        let offset = reader.position();
        let deleted = match reader.u64()? {
            0 => false,
            1 => true,
            _ => return Err(TermError::IntegerOverflow { offset }),
        };
        let offset = reader.position();
        let content_meta =
            u8::try_from(reader.u64()?).map_err(|_| TermError::IntegerOverflow { offset })?;
        let offset = reader.position();
        let size = u32::try_from(reader.u64()?).map_err(|_| TermError::IntegerOverflow { offset })?;

        Ok(Self {
            id: Bytes::new(),
            db_seq: 0,
            rev_seq,
            rev_meta,
            body_offset,
            deleted,
            content_meta,
            size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DocInfo {
        DocInfo {
            id: Bytes::from_static(b"doc-17"),
            db_seq: 70_000,
            rev_seq: 3,
            rev_meta: Bytes::from_static(&[0xDE, 0xAD, 0xBE, 0xEF]),
            body_offset: 1 << 40,
            deleted: true,
            content_meta: 0x80,
            size: 512,
        }
    }

    #[test]
    fn test_seq_entry_roundtrip() {
        let info = sample();
        let key = info.seq_key();
        let value = info.seq_value().expect("encode");
        assert_eq!(DocInfo::from_seq_entry(&key, &value).expect("decode"), info);
    }

    #[test]
    fn test_id_entry_roundtrip() {
        let info = sample();
        let key = info.id_key().expect("encode key");
        let value = info.id_value().expect("encode value");
        assert_eq!(DocInfo::from_id_entry(&key, &value).expect("decode"), info);
    }

    #[test]
    fn test_seq_value_layout() {
        let info = DocInfo {
            id: Bytes::from_static(b"a"),
            db_seq: 1,
            rev_seq: 1,
            rev_meta: Bytes::new(),
            body_offset: 4096,
            deleted: false,
            content_meta: 0,
            size: 10,
        };
        let value = info.seq_value().expect("encode");
        assert_eq!(
            value.as_ref(),
            &[
                104, 6, // {
                109, 0, 0, 0, 1, b'a', // id
                104, 2, 97, 1, 109, 0, 0, 0, 0, // {rev_seq, rev_meta}
                98, 0, 0, 16, 0, // body offset
                97, 0, // deleted
                97, 0, // content meta
                97, 10, // size
            ]
        );
    }

    #[test]
    fn test_wrong_index_rejected() {
        let info = sample();
        let value = info.seq_value().expect("encode");
        // A by-seq value starts with a binary where a by-id value has an integer.
        assert!(DocInfo::from_id_entry(&info.id_key().expect("key"), &value).is_err());
    }
}
