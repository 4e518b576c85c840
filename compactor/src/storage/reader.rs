//! In-order traversal of a tree written by `btree`.

use crate::btree::{NodeKind, RootPointer, decode_node};
use crate::storage::{Store, StorageError};

/// Deepest pointer-node nesting the reader follows before reporting
/// corruption.
pub const MAX_TREE_DEPTH: usize = 64;

/// Visit every leaf item under `root` in key order.
///
/// `prune` is offered the highest key of each child before descending; when
/// it returns `true` the child is skipped. Both callbacks receive the offset
/// of the node the key came from.
pub fn fold_tree<S, E>(
    store: &S,
    root: &RootPointer,
    prune: &mut dyn FnMut(u64, &[u8]) -> Result<bool, E>,
    visit: &mut dyn FnMut(u64, &[u8], &[u8]) -> Result<(), E>,
) -> Result<(), E>
where
    S: Store + ?Sized,
    E: From<StorageError>,
{
    fold_node(store, root.offset, 0, prune, visit)
}

fn fold_node<S, E>(
    store: &S,
    offset: u64,
    depth: usize,
    prune: &mut dyn FnMut(u64, &[u8]) -> Result<bool, E>,
    visit: &mut dyn FnMut(u64, &[u8], &[u8]) -> Result<(), E>,
) -> Result<(), E>
where
    S: Store + ?Sized,
    E: From<StorageError>,
{
    if depth > MAX_TREE_DEPTH {
        return Err(StorageError::TreeTooDeep { offset }.into());
    }
    let bytes = store.read_compressed(offset)?;
    let node = decode_node(&bytes).map_err(|source| StorageError::Term { offset, source })?;

    match node.kind {
        NodeKind::Leaf => {
            for item in &node.items {
                visit(offset, &item.key, &item.value)?;
            }
        }
        NodeKind::Pointer => {
            for item in &node.items {
                if prune(offset, &item.key)? {
                    continue;
                }
                let child = RootPointer::decode_value(&item.value)
                    .map_err(|source| StorageError::Term { offset, source })?;
                fold_node(store, child.offset, depth + 1, prune, visit)?;
            }
        }
    }
    Ok(())
}
