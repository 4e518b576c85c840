//! Store file I/O operations.
//!
//! A store file is a fixed-size header followed by an append-only sequence of
//! framed chunks:
//!
//! ```text
//! +--------------------+----------------+----------------+---------+
//! | header (4096)      | len: u32 LE    | crc32: u32 LE  | payload | ...
//! +--------------------+----------------+----------------+---------+
//! ```
//!
//! A chunk's offset is the file position of its length field. Chunks are
//! never rewritten; only the header is overwritten in place on commit.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::storage::header::{HEADER_SIZE, Header, HeaderError};
use crate::storage::io::{Store, StorageError};

/// Bytes of framing in front of every chunk payload.
pub const CHUNK_PREFIX_SIZE: u64 = 8;

/// A store file handle.
#[derive(Debug)]
pub struct StoreFile {
    file: File,
    header: Header,
    /// End of the last appended chunk.
    file_size: u64,
}

impl StoreFile {
    /// Create a new store file at the given path.
    ///
    /// Returns an error if the file already exists.
    pub fn create(path: &Path) -> Result<Self, StorageError> {
        if path.exists() {
            return Err(StorageError::AlreadyExists(path.to_path_buf()));
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        let header = Header::new();
        file.write_all(&header.to_bytes()?)?;
        file.sync_all()?;

        Ok(Self {
            file,
            header,
            file_size: HEADER_SIZE as u64,
        })
    }

    /// Open an existing store file and validate its header.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;

        let file_size = file.metadata()?.len();
        if file_size < HEADER_SIZE as u64 {
            return Err(HeaderError::Truncated(usize::try_from(file_size).unwrap_or(0)).into());
        }

        let mut buf = vec![0u8; HEADER_SIZE];
        file.read_exact(&mut buf)?;
        let header = Header::from_bytes(&buf)?;

        Ok(Self {
            file,
            header,
            file_size,
        })
    }

    /// Current size of the file in bytes.
    #[must_use]
    pub const fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Sync all pending writes to disk.
    pub fn sync(&self) -> Result<(), StorageError> {
        self.file.sync_all().map_err(StorageError::Io)
    }

    /// Sync and close the file.
    pub fn close(self) -> Result<(), StorageError> {
        self.sync()
    }
}

impl Store for StoreFile {
    fn write_raw(&mut self, bytes: &[u8]) -> Result<u64, StorageError> {
        let len = u32::try_from(bytes.len()).map_err(|_| StorageError::ChunkTooLarge(bytes.len()))?;
        let offset = self.file_size;

        let mut frame = BytesMut::with_capacity(bytes.len() + CHUNK_PREFIX_SIZE as usize);
        frame.put_u32_le(len);
        frame.put_u32_le(crc32fast::hash(bytes));
        frame.put_slice(bytes);

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&frame)?;
        self.file_size = offset + frame.len() as u64;

        Ok(offset)
    }

    fn read_raw(&self, offset: u64) -> Result<Bytes, StorageError> {
        let out_of_bounds = || StorageError::ChunkOutOfBounds {
            offset,
            file_size: self.file_size,
        };
        let payload_start = offset
            .checked_add(CHUNK_PREFIX_SIZE)
            .filter(|start| offset >= HEADER_SIZE as u64 && *start <= self.file_size)
            .ok_or_else(out_of_bounds)?;

        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset))?;
        let mut prefix = [0u8; CHUNK_PREFIX_SIZE as usize];
        file.read_exact(&mut prefix)?;
        let mut prefix = &prefix[..];
        let len = prefix.get_u32_le();
        let stored = prefix.get_u32_le();

        payload_start
            .checked_add(u64::from(len))
            .filter(|end| *end <= self.file_size)
            .ok_or_else(out_of_bounds)?;

        let mut payload = vec![0u8; len as usize];
        file.read_exact(&mut payload)?;

        let computed = crc32fast::hash(&payload);
        if computed != stored {
            return Err(StorageError::ChecksumMismatch {
                offset,
                stored,
                computed,
            });
        }

        Ok(Bytes::from(payload))
    }

    fn header(&self) -> &Header {
        &self.header
    }

    fn header_mut(&mut self) -> &mut Header {
        &mut self.header
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        // Chunks must be durable before the header that points at them.
        self.file.sync_data()?;
        let bytes = self.header.to_bytes()?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&bytes)?;
        self.file.sync_all()?;
        Ok(())
    }
}
