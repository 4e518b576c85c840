//! Five documents, compacted with a threshold small enough to split every
//! index into several leaves.

use crate::btree::{ByIdReduce, CountingReduce};
use crate::e2e_tests::helpers::{
    Fixture, assert_bodies, by_id_entries, by_seq_entries, low_threshold, reduce_of,
};
use crate::testing::SourceDoc;

fn five_docs() -> Vec<SourceDoc> {
    // Sequence order differs from id order.
    ["c", "a", "e", "b", "d"]
        .iter()
        .map(|id| {
            let size = 10 * (u32::from(id.as_bytes()[0] - b'a') + 1);
            SourceDoc::new(id, size)
        })
        .collect()
}

#[test]
fn test_five_documents_reduce_values() {
    let fixture = Fixture::new(&five_docs(), &[]);
    let (target, report) = fixture.compact(low_threshold());

    assert_eq!(report.documents, 5);
    assert!(report.by_seq.leaf_nodes >= 2);
    assert!(report.by_id.leaf_nodes >= 2);

    let header = target.committed_header().expect("committed");
    let count: CountingReduce = reduce_of(header.by_seq_root.as_ref());
    assert_eq!(count.count, 5);

    let stats: ByIdReduce = reduce_of(header.by_id_root.as_ref());
    assert_eq!(
        stats,
        ByIdReduce {
            live: 5,
            deleted: 0,
            total_size: 150,
        }
    );
}

#[test]
fn test_five_documents_key_order() {
    let fixture = Fixture::new(&five_docs(), &[]);
    let (target, _) = fixture.compact(low_threshold());

    let entries = by_id_entries(&target);
    let ids: Vec<&[u8]> = entries.iter().map(|info| info.id.as_ref()).collect();
    assert_eq!(ids, [b"a", b"b", b"c", b"d", b"e"]);
    assert_bodies(&target, &entries);
}

#[test]
fn test_five_documents_sequence_order_preserved() {
    let fixture = Fixture::new(&five_docs(), &[]);
    let (target, _) = fixture.compact(low_threshold());

    let entries = by_seq_entries(&target);
    let seqs: Vec<u64> = entries.iter().map(|info| info.db_seq).collect();
    assert_eq!(seqs, [1, 2, 3, 4, 5]);

    // Everything but the body offset survives unchanged.
    for (copied, original) in entries.iter().zip(&fixture.infos) {
        assert_eq!(copied.id, original.id);
        assert_eq!(copied.size, original.size);
        assert_eq!(copied.rev_meta, original.rev_meta);
        assert_ne!(copied.body_offset, 0);
    }
    assert_bodies(&target, &entries);
}

#[test]
fn test_default_threshold_single_leaf() {
    let fixture = Fixture::new(&five_docs(), &[]);
    let (_, report) = fixture.compact(crate::config::CompactConfig::default());

    assert_eq!(report.by_seq.leaf_nodes, 1);
    assert_eq!(report.by_seq.depth, 0);
    assert_eq!(report.by_id.leaf_nodes, 1);
}
