//! Compacting a store with no documents.

use crate::e2e_tests::helpers::{Fixture, by_id_entries, by_seq_entries, low_threshold};
use crate::storage::Store;

#[test]
fn test_empty_store_has_no_roots() {
    let mut fixture = Fixture::new(&[], &[]);
    fixture.source.set_update_seq(12);
    fixture.source.set_purge_seq(3);

    let (target, report) = fixture.compact(low_threshold());

    assert_eq!(report.documents, 0);
    assert_eq!(report.sort.records, 0);
    assert_eq!(report.sort.runs, 0);
    assert_eq!(report.by_seq.leaf_nodes, 0);
    assert!(report.by_seq.root.is_none());
    assert!(report.by_id.root.is_none());
    assert!(report.local_docs.root.is_none());

    let header = target.committed_header().expect("committed");
    assert!(header.by_seq_root.is_none());
    assert!(header.by_id_root.is_none());
    assert!(header.local_docs_root.is_none());
    assert_eq!(header.update_seq, 12);
    assert_eq!(header.purge_seq, 3);
    assert_eq!(target.chunk_count(), 0);

    assert!(by_seq_entries(&target).is_empty());
    assert!(by_id_entries(&target).is_empty());
}
