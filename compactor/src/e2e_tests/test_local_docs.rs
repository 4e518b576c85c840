//! Local documents and header counters are carried over.

use bytes::Bytes;

use crate::e2e_tests::helpers::{Fixture, local_docs, low_threshold};
use crate::storage::Store;
use crate::testing::SourceDoc;

#[test]
fn test_local_docs_copied() {
    let locals = [
        ("_local/replication-2", "checkpoint 17"),
        ("_local/config", "{}"),
        ("_local/replication-1", "checkpoint 9"),
    ];
    let fixture = Fixture::new(&[SourceDoc::new("a", 1)], &locals);
    let (target, report) = fixture.compact(low_threshold());

    assert_eq!(report.local_documents, 3);
    assert!(target.committed_header().expect("committed").local_docs_root.is_some());

    let copied = local_docs(&target);
    let mut expected: Vec<(Bytes, Bytes)> = locals
        .iter()
        .map(|(id, body)| (Bytes::from(*id), Bytes::from(*body)))
        .collect();
    expected.sort();
    assert_eq!(copied, expected);
    assert_eq!(copied, local_docs(&fixture.source));
}

#[test]
fn test_many_local_docs_span_nodes() {
    let owned: Vec<(String, String)> = (0..100)
        .map(|i| (format!("_local/{i:03}"), format!("value {i}")))
        .collect();
    let locals: Vec<(&str, &str)> = owned
        .iter()
        .map(|(id, body)| (id.as_str(), body.as_str()))
        .collect();
    let fixture = Fixture::new(&[], &locals);
    let (target, report) = fixture.compact(low_threshold());

    assert_eq!(report.local_documents, 100);
    assert!(report.local_docs.leaf_nodes > 1);
    assert_eq!(local_docs(&target).len(), 100);
}

#[test]
fn test_counters_copied() {
    let mut fixture = Fixture::new(&[SourceDoc::new("a", 1), SourceDoc::new("b", 2)], &[]);
    fixture.source.set_update_seq(40);
    fixture.source.set_purge_seq(7);

    let (target, report) = fixture.compact(low_threshold());
    let header = target.committed_header().expect("committed");
    assert_eq!(header.update_seq, 40);
    assert_eq!(header.purge_seq, 7);
    assert_eq!((report.update_seq, report.purge_seq), (40, 7));
}
