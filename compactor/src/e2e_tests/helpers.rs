//! Common helpers for end-to-end tests.

use bytes::Bytes;
use tempfile::TempDir;

use crate::btree::{Reduce, RootPointer};
use crate::compact::{CompactError, CompactReport, Compactor};
use crate::config::CompactConfig;
use crate::simulation::SimulatedStore;
use crate::storage::{StorageError, Store};
use crate::term::TermReader;
use crate::testing::{SourceDoc, populate};
use crate::types::DocInfo;

/// A populated in-memory source store.
pub struct Fixture {
    pub source: SimulatedStore,
    pub infos: Vec<DocInfo>,
    pub dir: TempDir,
}

impl Fixture {
    pub fn new(docs: &[SourceDoc], local_docs: &[(&str, &str)]) -> Self {
        let mut source = SimulatedStore::new(1);
        let infos = populate(&mut source, docs, local_docs, 64).expect("populate source");
        Self {
            source,
            infos,
            dir: tempfile::tempdir().expect("create temp dir"),
        }
    }

    /// Compact into `target`.
    pub fn compact_into(
        &self,
        config: CompactConfig,
        target: &mut SimulatedStore,
    ) -> Result<CompactReport, CompactError> {
        let mut records = tempfile::tempfile_in(self.dir.path()).expect("records file");
        Compactor::new(config)
            .with_temp_dir(self.dir.path())
            .run(&self.source, target, &mut records)
    }

    /// Compact into a fresh store, expecting success.
    pub fn compact(&self, config: CompactConfig) -> (SimulatedStore, CompactReport) {
        let mut target = SimulatedStore::new(2);
        let report = self.compact_into(config, &mut target).expect("compact");
        (target, report)
    }
}

/// A small threshold that forces several nodes per level.
pub fn low_threshold() -> CompactConfig {
    CompactConfig::default().with_chunk_threshold(64)
}

/// Decode a root's reduce value.
pub fn reduce_of<R: Reduce>(root: Option<&RootPointer>) -> R {
    root.expect("root present")
        .reduce_value()
        .expect("decode reduce")
}

/// Every by-id entry of `store`, in key order.
pub fn by_id_entries<S: Store>(store: &S) -> Vec<DocInfo> {
    let mut entries = Vec::new();
    store
        .fold_by_id::<StorageError, _>(|info| {
            entries.push(info);
            Ok(())
        })
        .expect("fold by id");
    entries
}

/// Every by-sequence entry of `store`, in sequence order.
pub fn by_seq_entries<S: Store>(store: &S) -> Vec<DocInfo> {
    let mut entries = Vec::new();
    store
        .changes_since::<StorageError, _>(0, |info| {
            entries.push(info);
            Ok(())
        })
        .expect("changes since");
    entries
}

/// Every local document of `store` as (id, body).
pub fn local_docs<S: Store>(store: &S) -> Vec<(Bytes, Bytes)> {
    let mut docs = Vec::new();
    store
        .fold_local_docs::<StorageError, _>(|item| {
            let id = TermReader::new(&item.key).binary().expect("binary key");
            let body = TermReader::new(&item.value).binary().expect("binary value");
            docs.push((Bytes::copy_from_slice(id), Bytes::copy_from_slice(body)));
            Ok(())
        })
        .expect("fold local docs");
    docs
}

/// Check that every entry's body offset reads back the expected body.
pub fn assert_bodies<S: Store>(store: &S, entries: &[DocInfo]) {
    for info in entries {
        assert_eq!(
            store.read_document_body(info).expect("read body"),
            SourceDoc::body_for(&info.id),
            "body of {:?}",
            info.id
        );
    }
}
