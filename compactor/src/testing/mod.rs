//! Fixtures for building source stores in tests.

use bytes::Bytes;

use crate::btree::{CountingReduce, KvItem, NodeBuilder, NodeKind, NullReduce, Reduce, TreeBuilder};
use crate::compact::PipelineError;
use crate::storage::Store;
use crate::term::encode_binary;
use crate::types::DocInfo;

/// A document to place in a source store.
#[derive(Debug, Clone)]
pub struct SourceDoc {
    pub id: Bytes,
    pub size: u32,
    pub deleted: bool,
}

impl SourceDoc {
    pub fn new(id: &str, size: u32) -> Self {
        Self {
            id: Bytes::copy_from_slice(id.as_bytes()),
            size,
            deleted: false,
        }
    }

    pub fn deleted(mut self) -> Self {
        self.deleted = true;
        self
    }

    /// The body stored for a document with this id.
    pub fn body_for(id: &[u8]) -> Bytes {
        let mut body = b"body:".to_vec();
        body.extend_from_slice(id);
        Bytes::from(body)
    }
}

/// Write `docs` (sequence numbers `1..=n` in slice order) and `local_docs`
/// into `store`, build its by-sequence and local-documents trees and commit.
///
/// Returns the metadata of every document as indexed in the store.
pub fn populate<S: Store>(
    store: &mut S,
    docs: &[SourceDoc],
    local_docs: &[(&str, &str)],
    chunk_threshold: usize,
) -> Result<Vec<DocInfo>, PipelineError> {
    let mut infos = Vec::with_capacity(docs.len());
    let mut seq = NodeBuilder::<CountingReduce>::new(NodeKind::Leaf, chunk_threshold);
    for (doc, db_seq) in docs.iter().zip(1..) {
        let body_offset = store.write_raw(&SourceDoc::body_for(&doc.id))?;
        let info = DocInfo {
            id: doc.id.clone(),
            db_seq,
            rev_seq: 1,
            rev_meta: Bytes::from_static(b"rev"),
            body_offset,
            deleted: doc.deleted,
            content_meta: 0,
            size: doc.size,
        };
        seq.add_item(&mut *store, KvItem::new(info.seq_key(), info.seq_value()?))?;
        infos.push(info);
    }
    let root = build(store, &mut seq, chunk_threshold)?;
    store.set_by_seq_root(root);

    let mut sorted_locals = local_docs.to_vec();
    sorted_locals.sort_unstable();
    let mut locals = NodeBuilder::<NullReduce>::new(NodeKind::Leaf, chunk_threshold);
    for (id, body) in sorted_locals {
        let item = KvItem::new(encode_binary(id.as_bytes())?, encode_binary(body.as_bytes())?);
        locals.add_item(&mut *store, item)?;
    }
    let root = build(store, &mut locals, chunk_threshold)?;
    store.set_local_docs_root(root);

    store.set_update_seq(infos.len() as u64);
    store.commit()?;
    Ok(infos)
}

fn build<S: Store, R: Reduce>(
    store: &mut S,
    leaves: &mut NodeBuilder<R>,
    chunk_threshold: usize,
) -> Result<Option<crate::btree::RootPointer>, PipelineError> {
    let pointers = leaves.finish(&mut *store)?;
    let root = TreeBuilder::new(chunk_threshold).build(store, pointers)?;
    Ok(root.map(|pointer| pointer.to_root()))
}
