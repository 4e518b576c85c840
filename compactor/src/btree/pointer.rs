//! References to flushed nodes.

use bytes::Bytes;

use crate::btree::Reduce;
use crate::term::{TermError, TermReader, TermWriter};

/// A flushed node: where it was written, the frozen reduce value of its
/// subtree, the bytes written for the whole subtree, and its highest key.
///
/// All fields are fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePointer<R: Reduce> {
    offset: u64,
    reduce: R,
    encoded_reduce: Bytes,
    subtree_size: u64,
    key: Bytes,
}

impl<R: Reduce> NodePointer<R> {
    /// Freeze `reduce` into a new pointer.
    #[must_use]
    pub fn new(offset: u64, reduce: R, subtree_size: u64, key: Bytes) -> Self {
        let encoded_reduce = reduce.encode();
        Self {
            offset,
            reduce,
            encoded_reduce,
            subtree_size,
            key,
        }
    }

    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.offset
    }

    #[must_use]
    pub const fn reduce(&self) -> &R {
        &self.reduce
    }

    #[must_use]
    pub const fn encoded_reduce(&self) -> &Bytes {
        &self.encoded_reduce
    }

    #[must_use]
    pub const fn subtree_size(&self) -> u64 {
        self.subtree_size
    }

    /// Highest key in the subtree.
    #[must_use]
    pub const fn key(&self) -> &Bytes {
        &self.key
    }

    /// Encode the value stored for this pointer in its parent node:
    /// `{offset, reduce, subtree_size}`.
    ///
    /// The parent builder sizes the item from the returned bytes, so this is
    /// the only place the layout is defined.
    #[must_use]
    pub fn encode_value(&self) -> Bytes {
        let mut writer = TermWriter::with_capacity(2 + 11 + self.encoded_reduce.len() + 11);
        writer.tuple_header(3);
        writer.u64(self.offset);
        writer.raw(&self.encoded_reduce);
        writer.u64(self.subtree_size);
        writer.finish()
    }

    /// Strip the key for installation as an index root.
    #[must_use]
    pub fn to_root(&self) -> RootPointer {
        RootPointer {
            offset: self.offset,
            reduce: self.encoded_reduce.clone(),
            subtree_size: self.subtree_size,
        }
    }
}

/// An index root as recorded in the file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootPointer {
    pub offset: u64,
    /// Encoded reduce value.
    pub reduce: Bytes,
    pub subtree_size: u64,
}

impl RootPointer {
    /// Decode a pointer value `{offset, reduce, subtree_size}` as found in a
    /// pointer node.
    pub fn decode_value(value: &[u8]) -> Result<Self, TermError> {
        let mut reader = TermReader::new(value);
        reader.tuple_of(3)?;
        let offset = reader.u64()?;
        let reduce = Bytes::copy_from_slice(reader.raw_term()?);
        let subtree_size = reader.u64()?;
        reader.finish()?;
        Ok(Self {
            offset,
            reduce,
            subtree_size,
        })
    }

    /// Decode the reduce value.
    pub fn reduce_value<R: Reduce>(&self) -> Result<R, TermError> {
        R::decode(&self.reduce)
    }
}
