//! Node encoding and the chunking node builder.
//!
//! A node is written as one chunk:
//!
//! ```text
//! 131, {kv_node | kp_node, [{Key, Value}, ...]}
//! ```
//!
//! Keys and values are already-encoded terms and are copied in verbatim. For
//! `n > 0` items the encoding is exactly `NODE_FRAMING + sum(ITEM_OVERHEAD +
//! key + value)` bytes, which is what the builder tracks as it fills a node.

use bytes::Bytes;
use tracing::debug;

use crate::btree::{NodeError, NodePointer, Reduce};
use crate::storage::Store;
use crate::term::{TermError, TermReader, TermWriter};

/// Bytes around the item list: version, tuple header, kind atom, list header
/// and the list's nil tail.
pub const NODE_FRAMING: usize = 1 + 2 + (3 + 7) + 5 + 1;

/// Bytes around each item: its 2-tuple header.
pub const ITEM_OVERHEAD: usize = 2;

/// A pre-encoded key/value pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvItem {
    pub key: Bytes,
    pub value: Bytes,
}

impl KvItem {
    #[must_use]
    pub const fn new(key: Bytes, value: Bytes) -> Self {
        Self { key, value }
    }

    /// Bytes this item adds to an encoded node.
    #[must_use]
    pub fn encoded_size(&self) -> usize {
        ITEM_OVERHEAD + self.key.len() + self.value.len()
    }
}

/// Node kind discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Holds key/value items.
    Leaf,
    /// Holds key/child-pointer items.
    Pointer,
}

impl NodeKind {
    #[must_use]
    pub const fn atom(self) -> &'static str {
        match self {
            Self::Leaf => "kv_node",
            Self::Pointer => "kp_node",
        }
    }
}

/// Encode a node.
pub fn encode_node(kind: NodeKind, items: &[KvItem]) -> Result<Bytes, TermError> {
    let body: usize = items.iter().map(KvItem::encoded_size).sum();
    let mut writer = TermWriter::with_capacity(NODE_FRAMING + body);
    writer.version();
    writer.tuple_header(2);
    writer.atom(kind.atom())?;
    writer.list_header(items.len())?;
    for item in items {
        writer.tuple_header(2);
        writer.raw(&item.key);
        writer.raw(&item.value);
    }
    if !items.is_empty() {
        writer.nil();
    }
    Ok(writer.finish())
}

/// A node read back from storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedNode {
    pub kind: NodeKind,
    pub items: Vec<KvItem>,
}

/// Decode a node written by `encode_node`.
pub fn decode_node(bytes: &[u8]) -> Result<DecodedNode, TermError> {
    let mut reader = TermReader::new(bytes);
    reader.version()?;
    reader.tuple_of(2)?;

    let offset = reader.position();
    let kind = match reader.atom()? {
        "kv_node" => NodeKind::Leaf,
        "kp_node" => NodeKind::Pointer,
        _ => return Err(TermError::InvalidAtom { offset }),
    };

    let len = reader.list_header()?;
    let mut items = Vec::with_capacity(len.min(4096));
    for _ in 0..len {
        reader.tuple_of(2)?;
        let key = Bytes::copy_from_slice(reader.raw_term()?);
        let value = Bytes::copy_from_slice(reader.raw_term()?);
        items.push(KvItem { key, value });
    }
    if len > 0 {
        reader.nil()?;
    }
    reader.finish()?;

    Ok(DecodedNode { kind, items })
}

/// Accumulates ordered items into nodes of roughly `chunk_threshold` bytes.
///
/// Items are written in the order they are added; the caller is responsible
/// for adding them in key order. Every flushed node yields a `NodePointer`,
/// collected until `take_pointers`.
#[derive(Debug)]
pub struct NodeBuilder<R: Reduce> {
    kind: NodeKind,
    chunk_threshold: usize,
    items: Vec<KvItem>,
    /// Encoded size of `items`, excluding node framing.
    node_size: usize,
    /// Subtree sizes of the child pointers in `items`.
    subtree_size: u64,
    reduce: R,
    pointers: Vec<NodePointer<R>>,
    nodes_written: u64,
}

impl<R: Reduce> NodeBuilder<R> {
    #[must_use]
    pub fn new(kind: NodeKind, chunk_threshold: usize) -> Self {
        Self {
            kind,
            chunk_threshold,
            items: Vec::new(),
            node_size: 0,
            subtree_size: 0,
            reduce: R::default(),
            pointers: Vec::new(),
            nodes_written: 0,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Number of nodes flushed so far.
    #[must_use]
    pub const fn nodes_written(&self) -> u64 {
        self.nodes_written
    }

    /// Pointers emitted and not yet taken.
    #[must_use]
    pub fn pointers(&self) -> &[NodePointer<R>] {
        &self.pointers
    }

    /// Add a leaf item, folding it in with `Reduce::accumulate_leaf`.
    pub fn add_item<S>(&mut self, store: &mut S, item: KvItem) -> Result<(), NodeError>
    where
        S: Store + ?Sized,
    {
        self.reduce.accumulate_leaf(&item)?;
        self.push(store, item)
    }

    /// Add a leaf item whose contribution to the reduce value is applied by
    /// `fold` instead of decoding the item.
    pub fn add_item_with<S, F>(&mut self, store: &mut S, item: KvItem, fold: F) -> Result<(), NodeError>
    where
        S: Store + ?Sized,
        F: FnOnce(&mut R),
    {
        fold(&mut self.reduce);
        self.push(store, item)
    }

    /// Add a child pointer as an item of a pointer node.
    pub fn add_pointer<S>(&mut self, store: &mut S, pointer: NodePointer<R>) -> Result<(), NodeError>
    where
        S: Store + ?Sized,
    {
        self.reduce.accumulate_subtree(pointer.reduce());
        self.subtree_size += pointer.subtree_size();
        let item = KvItem::new(pointer.key().clone(), pointer.encode_value());
        self.push(store, item)
    }

    fn push<S>(&mut self, store: &mut S, item: KvItem) -> Result<(), NodeError>
    where
        S: Store + ?Sized,
    {
        self.node_size += item.encoded_size();
        self.items.push(item);
        // A pointer node always takes at least two children, so every level
        // has fewer nodes than the one below it.
        let min_items = match self.kind {
            NodeKind::Leaf => 1,
            NodeKind::Pointer => 2,
        };
        if self.node_size > self.chunk_threshold && self.items.len() >= min_items {
            self.flush(store)?;
        }
        Ok(())
    }

    /// Write the pending items as one node. No-op when nothing is pending.
    pub fn flush<S>(&mut self, store: &mut S) -> Result<(), NodeError>
    where
        S: Store + ?Sized,
    {
        let Some(last) = self.items.last() else {
            return Ok(());
        };
        let key = last.key.clone();

        let encoded = encode_node(self.kind, &self.items)?;
        let expected = NODE_FRAMING + self.node_size;
        if encoded.len() != expected {
            return Err(NodeError::SizeMismatch {
                expected,
                actual: encoded.len(),
            });
        }

        let offset = store.write_compressed(&encoded)?;
        let subtree_size = self.subtree_size + encoded.len() as u64;
        debug!(
            kind = self.kind.atom(),
            offset,
            items = self.items.len(),
            bytes = encoded.len(),
            "flushed node"
        );

        self.pointers.push(NodePointer::new(
            offset,
            self.reduce.clone(),
            subtree_size,
            key,
        ));
        self.items.clear();
        self.node_size = 0;
        self.subtree_size = 0;
        self.reduce.reset();
        self.nodes_written += 1;
        Ok(())
    }

    /// Move out every pointer emitted so far.
    pub fn take_pointers(&mut self) -> Vec<NodePointer<R>> {
        std::mem::take(&mut self.pointers)
    }

    /// Flush any pending items and move out every pointer.
    pub fn finish<S>(&mut self, store: &mut S) -> Result<Vec<NodePointer<R>>, NodeError>
    where
        S: Store + ?Sized,
    {
        self.flush(store)?;
        Ok(self.take_pointers())
    }
}
