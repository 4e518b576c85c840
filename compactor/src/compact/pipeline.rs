//! The compaction state machine.

use std::fs::File;
use std::io::{BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info};

use crate::btree::{
    ByIdReduce, CountingReduce, KvItem, NodeBuilder, NodeKind, NullReduce, Reduce, TreeBuilder,
};
use crate::compact::{CompactError, CompactPhase, CompactReport, PipelineError, TreeSummary};
use crate::config::CompactConfig;
use crate::sort::{ExternalSorter, RecordCodec, SortStats};
use crate::storage::Store;
use crate::types::{DiskRecordCodec, DocInfo, decode_record, encode_record};

/// Runs compactions with a fixed configuration.
///
/// A `Compactor` holds no per-run state; `run` may be called any number of
/// times, each with its own source, target and record file.
#[derive(Debug, Clone)]
pub struct Compactor {
    config: CompactConfig,
    temp_dir: PathBuf,
}

impl Compactor {
    /// Create a compactor. Sort runs are spilled to the configured temporary
    /// directory, or the system one when none is configured.
    #[must_use]
    pub fn new(config: CompactConfig) -> Self {
        let temp_dir = config
            .temp_directory
            .clone()
            .unwrap_or_else(std::env::temp_dir);
        Self { config, temp_dir }
    }

    #[must_use]
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    #[must_use]
    pub const fn config(&self) -> &CompactConfig {
        &self.config
    }

    #[must_use]
    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Compact `source` into `target`.
    ///
    /// `records` is scratch space for the by-id records; it is truncated
    /// before use and its contents afterwards are unspecified. `target` is
    /// committed only if every earlier phase succeeded.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered, tagged with the phase it
    /// occurred in. Nothing is retried.
    pub fn run<S, T>(
        &self,
        source: &S,
        target: &mut T,
        records: &mut File,
    ) -> Result<CompactReport, CompactError>
    where
        S: Store,
        T: Store,
    {
        let started = Instant::now();
        let mut report = CompactReport::default();

        let (mut seq_leaves, documents) = enter(CompactPhase::ScanningSequenceIndex, || {
            self.scan(source, &mut *target, &mut *records)
        })?;
        report.documents = documents;

        report.by_seq = enter(CompactPhase::BuildingSequenceTree, || {
            let mut summary = self.build_tree(&mut *target, &mut seq_leaves)?;
            summary.items = documents;
            target.set_by_seq_root(summary.root.clone());
            Ok(summary)
        })?;

        report.sort = enter(CompactPhase::SortingKeyRecords, || self.sort_records(records))?;

        report.by_id = enter(CompactPhase::BuildingKeyTree, || {
            let summary = self.build_by_id(&mut *target, &mut *records)?;
            target.set_by_id_root(summary.root.clone());
            Ok(summary)
        })?;

        report.local_docs = enter(CompactPhase::CopyingAuxiliaryState, || {
            let summary = self.copy_local_docs(source, &mut *target)?;
            target.set_local_docs_root(summary.root.clone());
            target.set_update_seq(source.header().update_seq);
            target.set_purge_seq(source.header().purge_seq);
            Ok(summary)
        })?;
        report.local_documents = report.local_docs.items;
        report.update_seq = source.header().update_seq;
        report.purge_seq = source.header().purge_seq;

        enter(CompactPhase::Committed, || Ok(target.commit()?))?;

        info!(
            documents = report.documents,
            local_documents = report.local_documents,
            seq_leaf_nodes = report.by_seq.leaf_nodes,
            id_leaf_nodes = report.by_id.leaf_nodes,
            sort_runs = report.sort.runs,
            elapsed_ms = started.elapsed().as_millis(),
            "compaction complete"
        );
        Ok(report)
    }

    /// Copy every document body and collect both forms of its metadata.
    fn scan<S, T>(
        &self,
        source: &S,
        target: &mut T,
        records: &mut File,
    ) -> Result<(NodeBuilder<CountingReduce>, u64), PipelineError>
    where
        S: Store,
        T: Store,
    {
        records.set_len(0)?;
        records.seek(SeekFrom::Start(0))?;

        let mut builder = NodeBuilder::new(NodeKind::Leaf, self.config.chunk_threshold);
        let mut writer = BufWriter::new(&mut *records);
        let mut documents = 0;

        source.changes_since::<PipelineError, _>(0, |info| {
            let body = source.read_document_body(&info)?;
            let body_offset = target.write_raw(&body)?;
            let info = DocInfo {
                body_offset,
                ..info
            };

            builder.add_item(&mut *target, KvItem::new(info.seq_key(), info.seq_value()?))?;
            writer.write_all(&encode_record(&info)?)?;
            documents += 1;
            Ok(())
        })?;
        writer.flush()?;

        debug!(documents, "scanned by-sequence index");
        Ok((builder, documents))
    }

    fn sort_records(&self, records: &mut File) -> Result<SortStats, PipelineError> {
        let sorter = ExternalSorter::new(
            self.config.sort_block_size,
            self.config.max_record_size,
            self.config.merge_fan_in,
            &self.temp_dir,
        )?;
        Ok(sorter.sort_file(&DiskRecordCodec, records)?)
    }

    /// Build the by-id tree from sorted records. The reduce value is folded
    /// from each record header directly.
    fn build_by_id<T: Store>(
        &self,
        target: &mut T,
        records: &mut File,
    ) -> Result<TreeSummary, PipelineError> {
        records.seek(SeekFrom::Start(0))?;
        let mut reader = BufReader::new(&mut *records);
        let mut builder =
            NodeBuilder::<ByIdReduce>::new(NodeKind::Leaf, self.config.chunk_threshold);
        let mut record = Vec::new();
        let mut items = 0;

        while DiskRecordCodec.read_record(&mut reader, &mut record, self.config.max_record_size)? {
            let (header, info) = decode_record(&record)?;
            let item = KvItem::new(info.id_key()?, info.id_value()?);
            builder.add_item_with(&mut *target, item, |reduce| reduce.accumulate_raw_record(&header))?;
            items += 1;
        }

        let mut summary = self.build_tree(target, &mut builder)?;
        summary.items = items;
        Ok(summary)
    }

    /// Copy local documents verbatim into a fresh tree.
    fn copy_local_docs<S, T>(&self, source: &S, target: &mut T) -> Result<TreeSummary, PipelineError>
    where
        S: Store,
        T: Store,
    {
        let mut builder =
            NodeBuilder::<NullReduce>::new(NodeKind::Leaf, self.config.chunk_threshold);
        let mut items = 0;
        source.fold_local_docs::<PipelineError, _>(|item| {
            builder.add_item(&mut *target, item)?;
            items += 1;
            Ok(())
        })?;

        let mut summary = self.build_tree(target, &mut builder)?;
        summary.items = items;
        Ok(summary)
    }

    /// Flush `leaves` and build the levels above them.
    fn build_tree<R: Reduce, T: Store>(
        &self,
        target: &mut T,
        leaves: &mut NodeBuilder<R>,
    ) -> Result<TreeSummary, PipelineError> {
        let pointers = leaves.finish(&mut *target)?;
        let mut tree = TreeBuilder::new(self.config.chunk_threshold);
        let root = tree.build(target, pointers)?;
        Ok(TreeSummary {
            root: root.map(|pointer| pointer.to_root()),
            items: 0,
            leaf_nodes: leaves.nodes_written(),
            depth: tree.depth(),
        })
    }
}

/// Run one phase, tagging any failure with it.
fn enter<T, F>(phase: CompactPhase, step: F) -> Result<T, CompactError>
where
    F: FnOnce() -> Result<T, PipelineError>,
{
    info!(%phase, "compaction phase started");
    step().map_err(|source| CompactError::new(phase, source))
}
