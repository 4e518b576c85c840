//! Temporary-file records used to rebuild the by-id index.
//!
//! Each document seen while scanning the by-sequence index is appended to a
//! temporary file as a fixed header followed by the id and revision metadata:
//!
//! ```text
//! offset  size  field
//! 0       8     db_seq
//! 8       8     rev_seq
//! 16      8     body_offset
//! 24      4     len            (header + id + rev_meta)
//! 28      4     id_len
//! 32      4     rev_meta_len
//! 36      4     size
//! 40      1     deleted
//! 41      1     content_meta
//! 42      ...   id, rev_meta
//! ```
//!
//! The file never outlives a compaction, so fields are little-endian and
//! there is no version tag.

use std::cmp::Ordering;
use std::io::Read;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::sort::{RecordCodec, SortError, fill_or_eof};
use crate::types::DocInfo;

/// Size of the fixed record header.
pub const DISK_RECORD_HEADER_SIZE: usize = 42;

mod offsets {
    pub const LEN: usize = 24;
    pub const ID_LEN: usize = 28;
}

/// The fixed part of a temporary-file record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskRecordHeader {
    pub db_seq: u64,
    pub rev_seq: u64,
    pub body_offset: u64,
    /// Total record length, header included.
    pub len: u32,
    pub id_len: u32,
    pub rev_meta_len: u32,
    pub size: u32,
    pub deleted: bool,
    pub content_meta: u8,
}

impl DiskRecordHeader {
    /// Parse the header at the front of `buf` and check it against the
    /// buffer's length.
    pub fn parse(buf: &[u8]) -> Result<Self, RecordError> {
        if buf.len() < DISK_RECORD_HEADER_SIZE {
            return Err(RecordError::Truncated(buf.len()));
        }
        let mut fields = &buf[..DISK_RECORD_HEADER_SIZE];
        let header = Self {
            db_seq: fields.get_u64_le(),
            rev_seq: fields.get_u64_le(),
            body_offset: fields.get_u64_le(),
            len: fields.get_u32_le(),
            id_len: fields.get_u32_le(),
            rev_meta_len: fields.get_u32_le(),
            size: fields.get_u32_le(),
            deleted: fields.get_u8() != 0,
            content_meta: fields.get_u8(),
        };

        let expected = DISK_RECORD_HEADER_SIZE as u64
            + u64::from(header.id_len)
            + u64::from(header.rev_meta_len);
        if u64::from(header.len) != expected || buf.len() as u64 != expected {
            return Err(RecordError::LengthMismatch {
                declared: header.len,
                actual: buf.len(),
            });
        }
        Ok(header)
    }

    fn put(&self, buf: &mut BytesMut) {
        buf.put_u64_le(self.db_seq);
        buf.put_u64_le(self.rev_seq);
        buf.put_u64_le(self.body_offset);
        buf.put_u32_le(self.len);
        buf.put_u32_le(self.id_len);
        buf.put_u32_le(self.rev_meta_len);
        buf.put_u32_le(self.size);
        buf.put_u8(u8::from(self.deleted));
        buf.put_u8(self.content_meta);
    }
}

/// Encode a document's metadata as a temporary-file record.
pub fn encode_record(info: &DocInfo) -> Result<Bytes, RecordError> {
    let too_large = |field| RecordError::FieldTooLarge {
        field,
        len: info.id.len() + info.rev_meta.len(),
    };
    let id_len = u32::try_from(info.id.len()).map_err(|_| too_large("id"))?;
    let rev_meta_len = u32::try_from(info.rev_meta.len()).map_err(|_| too_large("rev_meta"))?;
    let total = DISK_RECORD_HEADER_SIZE + info.id.len() + info.rev_meta.len();
    let len = u32::try_from(total).map_err(|_| too_large("record"))?;

    let header = DiskRecordHeader {
        db_seq: info.db_seq,
        rev_seq: info.rev_seq,
        body_offset: info.body_offset,
        len,
        id_len,
        rev_meta_len,
        size: info.size,
        deleted: info.deleted,
        content_meta: info.content_meta,
    };

    let mut buf = BytesMut::with_capacity(total);
    header.put(&mut buf);
    buf.put_slice(&info.id);
    buf.put_slice(&info.rev_meta);
    Ok(buf.freeze())
}

/// Decode a temporary-file record into its header and the full metadata.
pub fn decode_record(buf: &[u8]) -> Result<(DiskRecordHeader, DocInfo), RecordError> {
    let header = DiskRecordHeader::parse(buf)?;
    let id_end = DISK_RECORD_HEADER_SIZE + header.id_len as usize;
    let info = DocInfo {
        id: Bytes::copy_from_slice(&buf[DISK_RECORD_HEADER_SIZE..id_end]),
        db_seq: header.db_seq,
        rev_seq: header.rev_seq,
        rev_meta: Bytes::copy_from_slice(&buf[id_end..]),
        body_offset: header.body_offset,
        deleted: header.deleted,
        content_meta: header.content_meta,
        size: header.size,
    };
    Ok((header, info))
}

/// Framing and key order of temporary-file records for the external sort.
///
/// Records compare by raw id bytes, so an id that is a strict prefix of
/// another sorts first.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskRecordCodec;

impl DiskRecordCodec {
    fn id(record: &[u8]) -> &[u8] {
        let id_len = record
            .get(offsets::ID_LEN..offsets::ID_LEN + 4)
            .map_or(0, |mut b| b.get_u32_le() as usize);
        record
            .get(DISK_RECORD_HEADER_SIZE..DISK_RECORD_HEADER_SIZE + id_len)
            .unwrap_or_default()
    }
}

impl RecordCodec for DiskRecordCodec {
    fn read_record<R: Read>(
        &self,
        reader: &mut R,
        buf: &mut Vec<u8>,
        max_record_size: usize,
    ) -> Result<bool, SortError> {
        buf.clear();
        buf.resize(DISK_RECORD_HEADER_SIZE, 0);
        if !fill_or_eof(reader, buf)? {
            return Ok(false);
        }

        let declared = (&buf[offsets::LEN..offsets::LEN + 4]).get_u32_le();
        let len = declared as usize;
        if len > max_record_size {
            return Err(SortError::RecordTooLarge {
                len,
                max: max_record_size,
            });
        }
        if len < DISK_RECORD_HEADER_SIZE {
            return Err(SortError::Codec(Box::new(RecordError::LengthMismatch {
                declared,
                actual: DISK_RECORD_HEADER_SIZE,
            })));
        }

        buf.resize(len, 0);
        if !fill_or_eof(reader, &mut buf[DISK_RECORD_HEADER_SIZE..])? {
            return Err(SortError::TruncatedRecord {
                expected: len - DISK_RECORD_HEADER_SIZE,
                actual: 0,
            });
        }
        DiskRecordHeader::parse(buf).map_err(|e| SortError::Codec(Box::new(e)))?;
        Ok(true)
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        Self::id(a).cmp(Self::id(b))
    }
}

/// Errors from malformed temporary-file records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// Fewer bytes than a record header.
    Truncated(usize),
    /// The declared length disagrees with the field lengths or the buffer.
    LengthMismatch { declared: u32, actual: usize },
    /// A variable-length field does not fit its length field.
    FieldTooLarge { field: &'static str, len: usize },
}

impl std::fmt::Display for RecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Truncated(len) => write!(f, "record of {len} bytes is shorter than its header"),
            Self::LengthMismatch { declared, actual } => write!(
                f,
                "record declares {declared} bytes but has {actual}"
            ),
            Self::FieldTooLarge { field, len } => {
                write!(f, "record field {field} too large ({len} bytes)")
            }
        }
    }
}

impl std::error::Error for RecordError {}
