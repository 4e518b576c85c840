//! Bulk B-tree construction.
//!
//! Trees are built bottom-up from items that are already in key order. There
//! is no search or update path; a finished tree is only ever read back by the
//! host engine (and by `storage::reader` in this crate).
//!
//! # Structure
//!
//! - [`NodeBuilder`] packs items into nodes of about `chunk_threshold` bytes
//!   and emits a [`NodePointer`] per node.
//! - [`TreeBuilder`] repeatedly packs pointers into pointer nodes until one
//!   root remains.
//! - [`Reduce`] implementations maintain an aggregate for every subtree.
//!
//! # Usage
//!
//! ```ignore
//! let mut leaves = NodeBuilder::<CountingReduce>::new(NodeKind::Leaf, DEFAULT_CHUNK_THRESHOLD);
//! for item in sorted_items {
//!     leaves.add_item(&mut store, item)?;
//! }
//! let root = TreeBuilder::new(DEFAULT_CHUNK_THRESHOLD)
//!     .build(&mut store, leaves.finish(&mut store)?)?;
//! ```

mod node;
mod pointer;
mod reduce;
mod tree;

pub use node::{
    DecodedNode, ITEM_OVERHEAD, KvItem, NODE_FRAMING, NodeBuilder, NodeKind, decode_node,
    encode_node,
};
pub use pointer::{NodePointer, RootPointer};
pub use reduce::{ByIdReduce, CountingReduce, NullReduce, Reduce};
pub use tree::TreeBuilder;

use crate::storage::StorageError;
use crate::term::TermError;

/// Node size above which a builder flushes.
pub const DEFAULT_CHUNK_THRESHOLD: usize = 1279;

/// Errors that can occur while building a tree.
#[derive(Debug)]
pub enum NodeError {
    /// Writing a node failed.
    Storage(StorageError),
    /// An item could not be encoded or reduced.
    Term(TermError),
    /// An encoded node's length differs from the tracked size.
    SizeMismatch { expected: usize, actual: usize },
}

impl std::fmt::Display for NodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "storage error: {e}"),
            Self::Term(e) => write!(f, "term error: {e}"),
            Self::SizeMismatch { expected, actual } => write!(
                f,
                "encoded node is {actual} bytes, expected {expected}"
            ),
        }
    }
}

impl std::error::Error for NodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(e) => Some(e),
            Self::Term(e) => Some(e),
            Self::SizeMismatch { .. } => None,
        }
    }
}

impl From<StorageError> for NodeError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<TermError> for NodeError {
    fn from(e: TermError) -> Self {
        Self::Term(e)
    }
}
