//! Compacting a real store file and reading the result back from disk.

use crate::btree::{ByIdReduce, CountingReduce};
use crate::compact::{compact_file, compact_path};
use crate::e2e_tests::helpers::{
    assert_bodies, by_id_entries, by_seq_entries, local_docs, low_threshold, reduce_of,
};
use crate::storage::{Store, StoreFile};
use crate::testing::{SourceDoc, populate};

#[test]
fn test_reopen_compacted_file() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("db.couch");

    let docs: Vec<SourceDoc> = ["e", "d", "c", "b", "a"]
        .iter()
        .zip([50, 40, 30, 20, 10])
        .map(|(id, size)| SourceDoc::new(id, size))
        .collect();
    let mut source = StoreFile::create(&path).expect("create source");
    populate(&mut source, &docs, &[("_local/x", "y")], 64).expect("populate");
    source.close().expect("close source");

    let report = compact_file(&path, &low_threshold()).expect("compact");
    assert_eq!(report.documents, 5);

    let compacted = StoreFile::open(&compact_path(&path)).expect("reopen");
    let header = compacted.header();
    let count: CountingReduce = reduce_of(header.by_seq_root.as_ref());
    assert_eq!(count.count, 5);
    let stats: ByIdReduce = reduce_of(header.by_id_root.as_ref());
    assert_eq!((stats.live, stats.deleted, stats.total_size), (5, 0, 150));
    assert_eq!(header.update_seq, 5);

    let by_id = by_id_entries(&compacted);
    let ids: Vec<&[u8]> = by_id.iter().map(|info| info.id.as_ref()).collect();
    assert_eq!(ids, [b"a", b"b", b"c", b"d", b"e"]);
    assert_bodies(&compacted, &by_id);

    let by_seq = by_seq_entries(&compacted);
    assert_eq!(by_seq.len(), 5);
    assert_eq!(by_seq[0].id, "e");
    assert_bodies(&compacted, &by_seq);

    assert_eq!(local_docs(&compacted).len(), 1);
}

#[test]
fn test_changes_since_on_compacted_file() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("db.couch");

    let docs: Vec<SourceDoc> = (0..60)
        .map(|i| SourceDoc::new(&format!("doc-{i:02}"), 1))
        .collect();
    let mut source = StoreFile::create(&path).expect("create source");
    populate(&mut source, &docs, &[], 64).expect("populate");
    source.close().expect("close source");

    compact_file(&path, &low_threshold()).expect("compact");
    let compacted = StoreFile::open(&compact_path(&path)).expect("reopen");

    let mut seqs = Vec::new();
    compacted
        .changes_since::<crate::storage::StorageError, _>(45, |info| {
            seqs.push(info.db_seq);
            Ok(())
        })
        .expect("changes since");
    assert_eq!(seqs, (45..=60).collect::<Vec<u64>>());
}

#[test]
fn test_empty_store_reopens_without_roots() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("empty.couch");

    let mut source = StoreFile::create(&path).expect("create source");
    populate(&mut source, &[], &[], 64).expect("populate");
    source.close().expect("close source");

    let report = compact_file(&path, &low_threshold()).expect("compact");
    assert_eq!(report.documents, 0);
    assert!(report.by_seq.reduce().is_none());

    let compacted = StoreFile::open(&compact_path(&path)).expect("reopen");
    let header = compacted.header();
    assert!(header.by_seq_root.is_none());
    assert!(header.by_id_root.is_none());
    assert!(header.local_docs_root.is_none());
    assert!(by_seq_entries(&compacted).is_empty());
}
