//! Host storage engine abstraction.
//!
//! The compactor only needs a narrow slice of the host engine: append raw
//! bytes, read them back, walk the existing indexes in order, and install new
//! roots into the header before committing. This trait is that slice, so the
//! pipeline runs unchanged against the real file format and against the
//! in-memory simulated store used in tests.
//!
//! # Design
//!
//! Reads take `&self` so the source store can be walked while its document
//! bodies are read from inside the walk callback. Writes and header changes
//! take `&mut self` and are only ever issued against the target store.

use std::path::PathBuf;

use bytes::Bytes;

use crate::btree::{KvItem, RootPointer};
use crate::storage::compress::{compress_chunk, decompress_chunk};
use crate::storage::header::{Header, HeaderError};
use crate::storage::reader;
use crate::term::{TermError, TermReader};
use crate::types::DocInfo;

/// Errors that can occur during storage operations.
#[derive(Debug)]
pub enum StorageError {
    /// I/O error.
    Io(std::io::Error),
    /// File already exists.
    AlreadyExists(PathBuf),
    /// Header could not be read or written.
    Header(HeaderError),
    /// A chunk offset points outside the written region.
    ChunkOutOfBounds { offset: u64, file_size: u64 },
    /// A chunk's stored checksum does not match its contents.
    ChecksumMismatch { offset: u64, stored: u32, computed: u32 },
    /// A node or value read from storage could not be decoded.
    Term { offset: u64, source: TermError },
    /// A compressed chunk could not be decompressed.
    Decompress { offset: u64, message: String },
    /// Pointer nodes nest deeper than any tree this crate builds.
    TreeTooDeep { offset: u64 },
    /// Chunk is too large to be framed.
    ChunkTooLarge(usize),
    /// Injected fault for simulation.
    InjectedFault(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::AlreadyExists(p) => write!(f, "file already exists: {}", p.display()),
            Self::Header(e) => write!(f, "header error: {e}"),
            Self::ChunkOutOfBounds { offset, file_size } => write!(
                f,
                "chunk at offset {offset} out of bounds (file size: {file_size})"
            ),
            Self::ChecksumMismatch {
                offset,
                stored,
                computed,
            } => write!(
                f,
                "checksum mismatch for chunk at offset {offset}: stored {stored:#010x}, computed {computed:#010x}"
            ),
            Self::Term { offset, source } => {
                write!(f, "malformed term in chunk at offset {offset}: {source}")
            }
            Self::Decompress { offset, message } => {
                write!(f, "cannot decompress chunk at offset {offset}: {message}")
            }
            Self::TreeTooDeep { offset } => {
                write!(f, "tree nested too deeply at node {offset}")
            }
            Self::ChunkTooLarge(len) => write!(f, "chunk of {len} bytes is too large"),
            Self::InjectedFault(msg) => write!(f, "injected fault: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Header(e) => Some(e),
            Self::Term { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<HeaderError> for StorageError {
    fn from(e: HeaderError) -> Self {
        Self::Header(e)
    }
}

/// The host engine operations the compactor consumes.
///
/// # Implementation Notes
///
/// Implementations must ensure:
/// - `write_raw` returns an offset that `read_raw` accepts and that yields
///   exactly the bytes written
/// - tree nodes go through `write_compressed` and `read_compressed`;
///   document bodies are stored as written
/// - header changes are only durable after `commit` succeeds
pub trait Store {
    /// Append a chunk and return the offset it was written at.
    fn write_raw(&mut self, bytes: &[u8]) -> Result<u64, StorageError>;

    /// Read back the chunk written at `offset`.
    fn read_raw(&self, offset: u64) -> Result<Bytes, StorageError>;

    /// Compress `bytes` and append them as a chunk.
    fn write_compressed(&mut self, bytes: &[u8]) -> Result<u64, StorageError> {
        let payload = compress_chunk(bytes)?;
        self.write_raw(&payload)
    }

    /// Read back and decompress a chunk written by `write_compressed`.
    fn read_compressed(&self, offset: u64) -> Result<Bytes, StorageError> {
        decompress_chunk(offset, &self.read_raw(offset)?)
    }

    /// The in-memory header (uncommitted changes included).
    fn header(&self) -> &Header;

    /// Mutable access to the in-memory header.
    fn header_mut(&mut self) -> &mut Header;

    /// Persist the header, making everything written so far reachable.
    fn commit(&mut self) -> Result<(), StorageError>;

    /// Read the body of a document given its index record.
    fn read_document_body(&self, info: &DocInfo) -> Result<Bytes, StorageError> {
        self.read_raw(info.body_offset)
    }

    fn set_by_seq_root(&mut self, root: Option<RootPointer>) {
        self.header_mut().by_seq_root = root;
    }

    fn set_by_id_root(&mut self, root: Option<RootPointer>) {
        self.header_mut().by_id_root = root;
    }

    fn set_local_docs_root(&mut self, root: Option<RootPointer>) {
        self.header_mut().local_docs_root = root;
    }

    fn set_update_seq(&mut self, seq: u64) {
        self.header_mut().update_seq = seq;
    }

    fn set_purge_seq(&mut self, seq: u64) {
        self.header_mut().purge_seq = seq;
    }

    /// Invoke `f` once per document with sequence number `>= since`, in
    /// ascending sequence order.
    fn changes_since<E, F>(&self, since: u64, mut f: F) -> Result<(), E>
    where
        Self: Sized,
        E: From<StorageError>,
        F: FnMut(DocInfo) -> Result<(), E>,
    {
        let Some(root) = self.header().by_seq_root.clone() else {
            return Ok(());
        };
        reader::fold_tree(
            self,
            &root,
            &mut |offset, highest_key| Ok(decode_seq(offset, highest_key)? < since),
            &mut |offset, key, value| {
                let info = DocInfo::from_seq_entry(key, value)
                    .map_err(|source| StorageError::Term { offset, source })?;
                if info.db_seq < since {
                    return Ok(());
                }
                f(info)
            },
        )
    }

    /// Invoke `f` once per document in the key index, in key order.
    fn fold_by_id<E, F>(&self, mut f: F) -> Result<(), E>
    where
        Self: Sized,
        E: From<StorageError>,
        F: FnMut(DocInfo) -> Result<(), E>,
    {
        let Some(root) = self.header().by_id_root.clone() else {
            return Ok(());
        };
        reader::fold_tree(
            self,
            &root,
            &mut |_, _| Ok(false),
            &mut |offset, key, value| {
                let info = DocInfo::from_id_entry(key, value)
                    .map_err(|source| StorageError::Term { offset, source })?;
                f(info)
            },
        )
    }

    /// Invoke `f` once per local document, handing over its encoded key and
    /// value terms untouched.
    fn fold_local_docs<E, F>(&self, mut f: F) -> Result<(), E>
    where
        Self: Sized,
        E: From<StorageError>,
        F: FnMut(KvItem) -> Result<(), E>,
    {
        let Some(root) = self.header().local_docs_root.clone() else {
            return Ok(());
        };
        reader::fold_tree(
            self,
            &root,
            &mut |_, _| Ok(false),
            &mut |_, key, value| {
                f(KvItem::new(
                    Bytes::copy_from_slice(key),
                    Bytes::copy_from_slice(value),
                ))
            },
        )
    }
}

fn decode_seq(offset: u64, key: &[u8]) -> Result<u64, StorageError> {
    TermReader::new(key)
        .u64()
        .map_err(|source| StorageError::Term { offset, source })
}
