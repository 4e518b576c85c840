//! File header structure and serialization.
//!
//! The header occupies the first `HEADER_SIZE` bytes of a store file and
//! records the update/purge sequence numbers and the roots of the three
//! indexes. All integers are little-endian. The last four bytes hold a CRC32
//! of everything before them.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::btree::RootPointer;

/// Magic number identifying a store file: "CSTORE01"
pub const MAGIC: [u8; 8] = *b"CSTORE01";

/// Current format version.
pub const FORMAT_VERSION: u32 = 1;

/// Size of the header region in bytes. Chunks start right after it.
pub const HEADER_SIZE: usize = 4096;

/// Header field offsets.
mod offsets {
    pub const MAGIC: usize = 0;
    pub const FORMAT_VERSION: usize = 8;
    pub const UPDATE_SEQ: usize = 16;
    pub const PURGE_SEQ: usize = 24;
    // Roots are variable-length and packed back to back from here.
    pub const ROOTS: usize = 32;
    pub const CHECKSUM: usize = super::HEADER_SIZE - 4;
}

/// Fixed bytes per encoded root: presence, offset, subtree size, reduce length.
const ROOT_FIXED_SIZE: usize = 1 + 8 + 8 + 2;

/// The header describes the committed state of a store file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Format version number.
    pub format_version: u32,
    /// Highest sequence number assigned by the host engine.
    pub update_seq: u64,
    /// Sequence number of the last purge.
    pub purge_seq: u64,
    /// Root of the index keyed by sequence number.
    pub by_seq_root: Option<RootPointer>,
    /// Root of the index keyed by document id.
    pub by_id_root: Option<RootPointer>,
    /// Root of the local (non-replicated) documents index.
    pub local_docs_root: Option<RootPointer>,
}

impl Header {
    /// Create a header for an empty file.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            format_version: FORMAT_VERSION,
            update_seq: 0,
            purge_seq: 0,
            by_seq_root: None,
            by_id_root: None,
            local_docs_root: None,
        }
    }

    /// Serialize the header to exactly `HEADER_SIZE` bytes.
    pub fn to_bytes(&self) -> Result<Bytes, HeaderError> {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE);
        buf.put_slice(&MAGIC);
        buf.put_u32_le(self.format_version);
        buf.put_u32_le(0);
        buf.put_u64_le(self.update_seq);
        buf.put_u64_le(self.purge_seq);
        debug_assert_eq!(buf.len(), offsets::ROOTS);

        for root in [&self.by_seq_root, &self.by_id_root, &self.local_docs_root] {
            put_root(&mut buf, root.as_ref())?;
        }
        if buf.len() > offsets::CHECKSUM {
            return Err(HeaderError::RootTooLarge(buf.len()));
        }

        buf.resize(offsets::CHECKSUM, 0);
        let checksum = crc32fast::hash(&buf);
        buf.put_u32_le(checksum);
        Ok(buf.freeze())
    }

    /// Deserialize a header, validating magic, version and checksum.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, HeaderError> {
        if bytes.len() < HEADER_SIZE {
            return Err(HeaderError::Truncated(bytes.len()));
        }
        let bytes = &bytes[..HEADER_SIZE];

        let mut magic = [0u8; 8];
        magic.copy_from_slice(&bytes[offsets::MAGIC..offsets::MAGIC + 8]);
        if magic != MAGIC {
            return Err(HeaderError::InvalidMagic(magic));
        }

        let mut checksum_bytes = &bytes[offsets::CHECKSUM..];
        let stored = checksum_bytes.get_u32_le();
        let computed = crc32fast::hash(&bytes[..offsets::CHECKSUM]);
        if stored != computed {
            return Err(HeaderError::ChecksumMismatch { stored, computed });
        }

        let mut fields = &bytes[offsets::FORMAT_VERSION..offsets::CHECKSUM];
        let format_version = fields.get_u32_le();
        if format_version != FORMAT_VERSION {
            return Err(HeaderError::UnsupportedVersion(format_version));
        }

        let mut fields = &bytes[offsets::UPDATE_SEQ..offsets::CHECKSUM];
        let update_seq = fields.get_u64_le();
        let mut fields = &bytes[offsets::PURGE_SEQ..offsets::CHECKSUM];
        let purge_seq = fields.get_u64_le();

        let mut roots = &bytes[offsets::ROOTS..offsets::CHECKSUM];
        let by_seq_root = get_root(&mut roots)?;
        let by_id_root = get_root(&mut roots)?;
        let local_docs_root = get_root(&mut roots)?;

        Ok(Self {
            format_version,
            update_seq,
            purge_seq,
            by_seq_root,
            by_id_root,
            local_docs_root,
        })
    }
}

impl Default for Header {
    fn default() -> Self {
        Self::new()
    }
}

fn put_root(buf: &mut BytesMut, root: Option<&RootPointer>) -> Result<(), HeaderError> {
    let Some(root) = root else {
        buf.put_u8(0);
        return Ok(());
    };
    let reduce_len =
        u16::try_from(root.reduce.len()).map_err(|_| HeaderError::RootTooLarge(root.reduce.len()))?;
    buf.put_u8(1);
    buf.put_u64_le(root.offset);
    buf.put_u64_le(root.subtree_size);
    buf.put_u16_le(reduce_len);
    buf.put_slice(&root.reduce);
    Ok(())
}

fn get_root(buf: &mut &[u8]) -> Result<Option<RootPointer>, HeaderError> {
    if buf.remaining() < 1 {
        return Err(HeaderError::Truncated(HEADER_SIZE));
    }
    if buf.get_u8() == 0 {
        return Ok(None);
    }
    if buf.remaining() < ROOT_FIXED_SIZE - 1 {
        return Err(HeaderError::Truncated(HEADER_SIZE));
    }
    let offset = buf.get_u64_le();
    let subtree_size = buf.get_u64_le();
    let reduce_len = usize::from(buf.get_u16_le());
    if buf.remaining() < reduce_len {
        return Err(HeaderError::Truncated(HEADER_SIZE));
    }
    let reduce = buf.copy_to_bytes(reduce_len);
    Ok(Some(RootPointer {
        offset,
        reduce,
        subtree_size,
    }))
}

/// Errors that can occur when reading or writing a header.
#[derive(Debug)]
pub enum HeaderError {
    /// Invalid magic number.
    InvalidMagic([u8; 8]),
    /// Unsupported format version.
    UnsupportedVersion(u32),
    /// Stored checksum does not match the header contents.
    ChecksumMismatch { stored: u32, computed: u32 },
    /// Fewer bytes than a full header (or a root ran past the end).
    Truncated(usize),
    /// The encoded roots do not fit in the header region.
    RootTooLarge(usize),
}

impl std::fmt::Display for HeaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidMagic(magic) => {
                write!(
                    f,
                    "invalid magic number: {:?}",
                    String::from_utf8_lossy(magic)
                )
            }
            Self::UnsupportedVersion(v) => write!(f, "unsupported format version: {v}"),
            Self::ChecksumMismatch { stored, computed } => write!(
                f,
                "header checksum mismatch: stored {stored:#010x}, computed {computed:#010x}"
            ),
            Self::Truncated(len) => write!(f, "truncated header ({len} bytes)"),
            Self::RootTooLarge(len) => write!(f, "index roots too large for header ({len} bytes)"),
        }
    }
}

impl std::error::Error for HeaderError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn root(offset: u64, reduce: &'static [u8]) -> RootPointer {
        RootPointer {
            offset,
            reduce: Bytes::from_static(reduce),
            subtree_size: offset * 2,
        }
    }

    #[test]
    fn test_header_roundtrip() {
        let mut header = Header::new();
        header.update_seq = 1_234_567;
        header.purge_seq = 42;
        header.by_seq_root = Some(root(4096, &[97, 5]));
        header.by_id_root = Some(root(8192, &[104, 3, 97, 4, 97, 1, 97, 200]));

        let bytes = header.to_bytes().expect("should serialize");
        assert_eq!(bytes.len(), HEADER_SIZE);

        let restored = Header::from_bytes(&bytes).expect("should parse");
        assert_eq!(restored, header);
        assert!(restored.local_docs_root.is_none());
    }

    #[test]
    fn test_header_invalid_magic() {
        let mut bytes = Header::new().to_bytes().expect("serialize").to_vec();
        bytes[..8].copy_from_slice(b"BADMAGIC");

        let result = Header::from_bytes(&bytes);
        assert!(matches!(result, Err(HeaderError::InvalidMagic(_))));
    }

    #[test]
    fn test_header_detects_corruption() {
        let mut bytes = Header::new().to_bytes().expect("serialize").to_vec();
        bytes[offsets::UPDATE_SEQ] ^= 0xFF;

        let result = Header::from_bytes(&bytes);
        assert!(matches!(result, Err(HeaderError::ChecksumMismatch { .. })));
    }

    #[test]
    fn test_header_truncated() {
        let result = Header::from_bytes(&[0u8; 100]);
        assert!(matches!(result, Err(HeaderError::Truncated(100))));
    }

    #[test]
    fn test_header_root_too_large() {
        static BIG: [u8; 2000] = [0u8; 2000];
        let mut header = Header::new();
        header.by_seq_root = Some(root(1, &BIG));
        header.by_id_root = Some(root(2, &BIG));

        let result = header.to_bytes();
        assert!(matches!(result, Err(HeaderError::RootTooLarge(_))));
    }
}
