//! Deleted documents are counted separately but still contribute their size.

use crate::btree::{ByIdReduce, CountingReduce};
use crate::e2e_tests::helpers::{Fixture, by_id_entries, low_threshold, reduce_of};
use crate::testing::SourceDoc;

fn ten_docs() -> Vec<SourceDoc> {
    (0..10)
        .map(|i| {
            let id = format!("doc-{i}");
            if i % 3 == 0 && i > 0 {
                SourceDoc::new(&id, 5).deleted()
            } else {
                SourceDoc::new(&id, 100)
            }
        })
        .collect()
}

#[test]
fn test_deletion_accounting() {
    let docs = ten_docs();
    assert_eq!(docs.iter().filter(|doc| doc.deleted).count(), 3);

    let fixture = Fixture::new(&docs, &[]);
    let (target, _) = fixture.compact(low_threshold());
    let header = target.committed_header().expect("committed");

    let stats: ByIdReduce = reduce_of(header.by_id_root.as_ref());
    assert_eq!(
        stats,
        ByIdReduce {
            live: 7,
            deleted: 3,
            total_size: 3 * 5 + 7 * 100,
        }
    );
    assert_eq!(stats.total_size, 715);

    // Deleted documents are still indexed by sequence.
    let count: CountingReduce = reduce_of(header.by_seq_root.as_ref());
    assert_eq!(count.count, 10);
}

#[test]
fn test_deleted_flag_survives() {
    let fixture = Fixture::new(&ten_docs(), &[]);
    let (target, _) = fixture.compact(low_threshold());

    let deleted: Vec<_> = by_id_entries(&target)
        .into_iter()
        .filter(|info| info.deleted)
        .map(|info| info.id)
        .collect();
    assert_eq!(deleted, ["doc-3", "doc-6", "doc-9"]);
}

#[test]
fn test_reduce_independent_of_threshold() {
    let fixture = Fixture::new(&ten_docs(), &[]);
    let expected = ByIdReduce {
        live: 7,
        deleted: 3,
        total_size: 715,
    };

    for threshold in [1, 40, 64, 200, 1279, 100_000] {
        let config = low_threshold().with_chunk_threshold(threshold);
        let (target, _) = fixture.compact(config);
        let header = target.committed_header().expect("committed");
        let stats: ByIdReduce = reduce_of(header.by_id_root.as_ref());
        assert_eq!(stats, expected, "threshold {threshold}");
    }
}
