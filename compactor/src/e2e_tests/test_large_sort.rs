//! Enough documents, and a small enough sort block, to force spilled runs and
//! several merge passes during compaction.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::btree::{ByIdReduce, CountingReduce};
use crate::e2e_tests::helpers::{Fixture, by_id_entries, low_threshold, reduce_of};
use crate::testing::SourceDoc;

#[test]
fn test_multi_pass_merge_during_compaction() {
    let mut rng = StdRng::seed_from_u64(42);
    let mut ids: Vec<String> = (0..500).map(|i| format!("user/{i}")).collect();
    ids.shuffle(&mut rng);
    let docs: Vec<SourceDoc> = ids
        .iter()
        .map(|id| {
            let doc = SourceDoc::new(id, rng.random_range(1..1000));
            if rng.random_bool(0.1) { doc.deleted() } else { doc }
        })
        .collect();

    let fixture = Fixture::new(&docs, &[]);
    let config = low_threshold()
        .with_chunk_threshold(256)
        .with_sort_block_size(16)
        .with_merge_fan_in(3);
    let (target, report) = fixture.compact(config);

    assert_eq!(report.sort.records, 500);
    assert_eq!(report.sort.runs, 32);
    // 32 -> 11 -> 4 -> 2 intermediate runs, then the final merge.
    assert_eq!(report.sort.merge_passes, 4);

    let entries = by_id_entries(&target);
    let mut expected = ids.clone();
    expected.sort();
    let actual: Vec<&[u8]> = entries.iter().map(|info| info.id.as_ref()).collect();
    let expected: Vec<&[u8]> = expected.iter().map(String::as_bytes).collect();
    assert_eq!(actual, expected);

    let header = target.committed_header().expect("committed");
    let count: CountingReduce = reduce_of(header.by_seq_root.as_ref());
    assert_eq!(count.count, 500);

    let stats: ByIdReduce = reduce_of(header.by_id_root.as_ref());
    let deleted = docs.iter().filter(|doc| doc.deleted).count() as u64;
    let total: u64 = docs.iter().map(|doc| u64::from(doc.size)).sum();
    assert_eq!(
        stats,
        ByIdReduce {
            live: 500 - deleted,
            deleted,
            total_size: total,
        }
    );
    assert!(report.by_id.depth >= 2);
}
