//! Bottom-up tree construction.
//!
//! Leaf pointers are fed through a pointer-node builder, the pointers that
//! builder emits are fed through the next one up, and so on until a level
//! produces exactly one pointer: the root. Each level consumes the previous
//! level's pointers once, in key order.

use tracing::debug;

use crate::btree::{NodeBuilder, NodeError, NodeKind, NodePointer, Reduce};
use crate::storage::Store;

/// Builds the pointer levels above a list of leaf pointers.
#[derive(Debug)]
pub struct TreeBuilder<R: Reduce> {
    chunk_threshold: usize,
    /// One builder per pointer level, index 0 directly above the leaves.
    levels: Vec<NodeBuilder<R>>,
}

impl<R: Reduce> TreeBuilder<R> {
    #[must_use]
    pub const fn new(chunk_threshold: usize) -> Self {
        Self {
            chunk_threshold,
            levels: Vec::new(),
        }
    }

    /// Number of pointer levels built by the last `build`.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.levels.len()
    }

    /// Collapse `leaves` into a single root pointer.
    ///
    /// Returns `None` for an empty tree: no node is written, so an empty index
    /// has no root and no root reduce value. A single leaf pointer is returned
    /// unchanged.
    pub fn build<S>(
        &mut self,
        store: &mut S,
        leaves: Vec<NodePointer<R>>,
    ) -> Result<Option<NodePointer<R>>, NodeError>
    where
        S: Store + ?Sized,
    {
        self.levels.clear();
        let mut pointers = leaves;

        loop {
            if pointers.len() <= 1 {
                return Ok(pointers.pop());
            }

            let depth = self.levels.len();
            self.levels
                .push(NodeBuilder::new(NodeKind::Pointer, self.chunk_threshold));
            let level = &mut self.levels[depth];

            let children = pointers.len();
            for pointer in pointers {
                level.add_pointer(store, pointer)?;
            }
            pointers = level.finish(store)?;
            debug!(depth, children, nodes = pointers.len(), "built tree level");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::{ByIdReduce, CountingReduce, KvItem, decode_node};
    use crate::simulation::SimulatedStore;
    use crate::term::encode_u64;
    use crate::types::DocInfo;
    use bytes::Bytes;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn leaves<R: Reduce>(
        store: &mut SimulatedStore,
        items: &[KvItem],
        threshold: usize,
    ) -> Vec<NodePointer<R>> {
        let mut builder = NodeBuilder::<R>::new(NodeKind::Leaf, threshold);
        for item in items {
            builder.add_item(store, item.clone()).expect("add");
        }
        builder.finish(store).expect("finish")
    }

    fn seq_items(n: u64) -> Vec<KvItem> {
        (1..=n)
            .map(|i| KvItem::new(encode_u64(i), encode_u64(i * 10)))
            .collect()
    }

    fn id_items(docs: &[(bool, u32)]) -> Vec<KvItem> {
        docs.iter()
            .enumerate()
            .map(|(i, &(deleted, size))| {
                let info = DocInfo {
                    id: Bytes::from(format!("doc{i:05}")),
                    db_seq: i as u64 + 1,
                    deleted,
                    size,
                    ..DocInfo::default()
                };
                KvItem::new(info.id_key().expect("key"), info.id_value().expect("value"))
            })
            .collect()
    }

    /// Walk the tree, checking leaf depth, and return leaf items in order.
    fn collect(
        store: &SimulatedStore,
        offset: u64,
        depth: usize,
        leaf_depths: &mut Vec<usize>,
        out: &mut Vec<KvItem>,
    ) {
        let node = decode_node(&store.read_compressed(offset).expect("read")).expect("decode");
        match node.kind {
            NodeKind::Leaf => {
                leaf_depths.push(depth);
                out.extend(node.items);
            }
            NodeKind::Pointer => {
                for item in node.items {
                    let child = crate::btree::RootPointer::decode_value(&item.value).expect("ptr");
                    collect(store, child.offset, depth + 1, leaf_depths, out);
                }
            }
        }
    }

    #[test]
    fn test_empty_input_has_no_root() {
        let mut store = SimulatedStore::new(1);
        let mut tree = TreeBuilder::<CountingReduce>::new(64);
        assert!(tree.build(&mut store, Vec::new()).expect("build").is_none());
        assert_eq!(store.stats().writes, 0);
    }

    #[test]
    fn test_single_leaf_is_root() {
        let mut store = SimulatedStore::new(1);
        let leaf = leaves::<CountingReduce>(&mut store, &seq_items(3), 1279);
        assert_eq!(leaf.len(), 1);
        let expected = leaf[0].clone();

        let mut tree = TreeBuilder::new(1279);
        let root = tree.build(&mut store, leaf).expect("build").expect("root");
        assert_eq!(root, expected);
        assert_eq!(tree.depth(), 0);
    }

    #[test]
    fn test_converges_for_any_threshold() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..60 {
            let n = rng.random_range(1..400);
            let threshold = rng.random_range(1..300);
            let items = seq_items(n);

            let mut store = SimulatedStore::new(1);
            let leaf = leaves::<CountingReduce>(&mut store, &items, threshold);
            let mut tree = TreeBuilder::new(threshold);
            let root = tree
                .build(&mut store, leaf)
                .expect("build")
                .expect("non-empty tree has a root");

            assert_eq!(root.reduce().count, n, "n={n} threshold={threshold}");
            assert_eq!(root.key(), &encode_u64(n));

            let mut depths = Vec::new();
            let mut out = Vec::new();
            collect(&store, root.offset(), 0, &mut depths, &mut out);
            assert_eq!(out, items, "leaf order n={n} threshold={threshold}");
            assert!(
                depths.iter().all(|d| *d == tree.depth()),
                "leaves at uneven depths {depths:?}"
            );
        }
    }

    #[test]
    fn test_threshold_of_one() {
        let mut store = SimulatedStore::new(1);
        let leaf = leaves::<CountingReduce>(&mut store, &seq_items(9), 1);
        assert_eq!(leaf.len(), 9);

        let mut tree = TreeBuilder::new(1);
        let root = tree.build(&mut store, leaf).expect("build").expect("root");
        assert_eq!(root.reduce().count, 9);
        // Pairs at every level: 9 -> 5 -> 3 -> 2 -> 1.
        assert_eq!(tree.depth(), 4);
    }

    #[test]
    fn test_by_id_reduce_independent_of_threshold() {
        let mut rng = StdRng::seed_from_u64(7);
        let docs: Vec<(bool, u32)> = (0..250)
            .map(|_| (rng.random_bool(0.3), rng.random_range(0..10_000)))
            .collect();
        let expected = docs.iter().fold(ByIdReduce::default(), |mut acc, &(deleted, size)| {
            if deleted {
                acc.deleted += 1;
            } else {
                acc.live += 1;
            }
            acc.total_size += u64::from(size);
            acc
        });
        let items = id_items(&docs);

        for threshold in [1, 50, 200, 1279, 100_000] {
            let mut store = SimulatedStore::new(1);
            let leaf = leaves::<ByIdReduce>(&mut store, &items, threshold);
            let root = TreeBuilder::new(threshold)
                .build(&mut store, leaf)
                .expect("build")
                .expect("root");
            assert_eq!(*root.reduce(), expected, "threshold {threshold}");
            assert_eq!(
                root.to_root().reduce_value::<ByIdReduce>().expect("decode"),
                expected
            );
        }
    }

    /// Uncompressed size of every node under `offset`.
    fn encoded_size(store: &SimulatedStore, offset: u64) -> u64 {
        let bytes = store.read_compressed(offset).expect("read");
        let node = decode_node(&bytes).expect("decode");
        let children: u64 = match node.kind {
            NodeKind::Leaf => 0,
            NodeKind::Pointer => node
                .items
                .iter()
                .map(|item| {
                    let child = crate::btree::RootPointer::decode_value(&item.value).expect("ptr");
                    encoded_size(store, child.offset)
                })
                .sum(),
        };
        bytes.len() as u64 + children
    }

    #[test]
    fn test_subtree_size_counts_every_node() {
        let mut store = SimulatedStore::new(1);
        let leaf = leaves::<CountingReduce>(&mut store, &seq_items(50), 40);
        let root = TreeBuilder::new(40)
            .build(&mut store, leaf)
            .expect("build")
            .expect("root");
        assert_eq!(root.subtree_size(), encoded_size(&store, root.offset()));
        assert!(store.stats().writes > 1);
    }
}
