//! Host storage engine surface.
//!
//! The compactor reads the old store and writes the new one through the
//! [`Store`] trait. [`StoreFile`] is the on-disk implementation.
//!
//! # File Format
//!
//! A store is a single append-only file:
//!
//! - Bytes 0-4095: header (magic, version, sequence counters, index roots,
//!   CRC32)
//! - Remaining bytes: checksummed chunks holding document bodies and
//!   zstd-compressed tree nodes
//!
//! # Usage
//!
//! ```ignore
//! use compactor::storage::{Store, StoreFile};
//!
//! let mut store = StoreFile::create(path)?;
//! let offset = store.write_raw(b"document body")?;
//! store.set_update_seq(1);
//! store.commit()?;
//! ```

mod compress;
mod file;
mod header;
mod io;
pub mod reader;

pub use file::{CHUNK_PREFIX_SIZE, StoreFile};
pub use header::{FORMAT_VERSION, HEADER_SIZE, Header, HeaderError, MAGIC};
pub use io::{StorageError, Store};
