//! Compressed chunk payloads.
//!
//! Tree nodes are stored zstd-compressed; document bodies are not. A
//! compressed payload is framed inside an ordinary chunk:
//!
//! ```text
//! +-------------------------+------------------+
//! | uncompressed len: u32 LE| zstd frame       |
//! +-------------------------+------------------+
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::storage::io::StorageError;

/// Compression level for node chunks. Nodes are small and written once, so
/// build speed wins over ratio.
const COMPRESSION_LEVEL: i32 = 1;

/// Largest uncompressed length a compressed chunk may declare.
const MAX_DECOMPRESSED_SIZE: usize = 64 * 1024 * 1024;

const LEN_PREFIX_SIZE: usize = 4;

/// Compress `bytes` into a length-prefixed payload.
pub fn compress_chunk(bytes: &[u8]) -> Result<Bytes, StorageError> {
    let len = u32::try_from(bytes.len()).map_err(|_| StorageError::ChunkTooLarge(bytes.len()))?;
    let compressed = zstd::bulk::compress(bytes, COMPRESSION_LEVEL)?;

    let mut payload = BytesMut::with_capacity(LEN_PREFIX_SIZE + compressed.len());
    payload.put_u32_le(len);
    payload.put_slice(&compressed);
    Ok(payload.freeze())
}

/// Undo `compress_chunk` on the payload of the chunk at `offset`.
pub fn decompress_chunk(offset: u64, payload: &[u8]) -> Result<Bytes, StorageError> {
    let corrupt = |message: String| StorageError::Decompress { offset, message };

    if payload.len() < LEN_PREFIX_SIZE {
        return Err(corrupt(format!(
            "payload of {} bytes has no length prefix",
            payload.len()
        )));
    }
    let mut prefix = &payload[..LEN_PREFIX_SIZE];
    let expected = prefix.get_u32_le() as usize;
    if expected > MAX_DECOMPRESSED_SIZE {
        return Err(corrupt(format!(
            "declared size {expected} exceeds maximum {MAX_DECOMPRESSED_SIZE}"
        )));
    }

    let decompressed = zstd::bulk::decompress(&payload[LEN_PREFIX_SIZE..], expected)
        .map_err(|e| corrupt(e.to_string()))?;
    if decompressed.len() != expected {
        return Err(corrupt(format!(
            "decompressed {} bytes, header declared {expected}",
            decompressed.len()
        )));
    }
    Ok(Bytes::from(decompressed))
}
