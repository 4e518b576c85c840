//! The compaction pipeline.
//!
//! Compaction copies every live structure of a store into a fresh one:
//!
//! 1. Scan the old by-sequence index, copying each document body and
//!    recording its metadata twice: as a by-sequence leaf and as a
//!    temporary-file record.
//! 2. Build the by-sequence tree above those leaves.
//! 3. Sort the temporary records by document id.
//! 4. Build the by-id tree from the sorted records.
//! 5. Copy local documents and the header counters.
//! 6. Commit the new header.
//!
//! Any error aborts the run. The error names the phase it happened in; the
//! old store is never written to.

mod file;
mod pipeline;

pub use file::{compact_file, compact_path};
pub use pipeline::Compactor;

use bytes::Bytes;

use crate::btree::{NodeError, RootPointer};
use crate::sort::{SortError, SortStats};
use crate::storage::StorageError;
use crate::term::TermError;
use crate::types::RecordError;

/// Stages of a compaction run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CompactPhase {
    ScanningSequenceIndex,
    BuildingSequenceTree,
    SortingKeyRecords,
    BuildingKeyTree,
    CopyingAuxiliaryState,
    /// Persisting the new header.
    Committed,
}

impl std::fmt::Display for CompactPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::ScanningSequenceIndex => "scan",
            Self::BuildingSequenceTree => "sequence-tree build",
            Self::SortingKeyRecords => "sort",
            Self::BuildingKeyTree => "key-tree build",
            Self::CopyingAuxiliaryState => "finalize (auxiliary state)",
            Self::Committed => "finalize (commit)",
        };
        f.write_str(name)
    }
}

/// What went wrong inside a phase.
#[derive(Debug)]
pub enum PipelineError {
    Storage(StorageError),
    Node(NodeError),
    Sort(SortError),
    Term(TermError),
    Record(RecordError),
    /// I/O on the temporary record file.
    Io(std::io::Error),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Storage(e) => write!(f, "storage error: {e}"),
            Self::Node(e) => write!(f, "node error: {e}"),
            Self::Sort(e) => write!(f, "sort error: {e}"),
            Self::Term(e) => write!(f, "term error: {e}"),
            Self::Record(e) => write!(f, "record error: {e}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(e) => Some(e),
            Self::Node(e) => Some(e),
            Self::Sort(e) => Some(e),
            Self::Term(e) => Some(e),
            Self::Record(e) => Some(e),
            Self::Io(e) => Some(e),
        }
    }
}

impl From<StorageError> for PipelineError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<NodeError> for PipelineError {
    fn from(e: NodeError) -> Self {
        Self::Node(e)
    }
}

impl From<SortError> for PipelineError {
    fn from(e: SortError) -> Self {
        Self::Sort(e)
    }
}

impl From<TermError> for PipelineError {
    fn from(e: TermError) -> Self {
        Self::Term(e)
    }
}

impl From<RecordError> for PipelineError {
    fn from(e: RecordError) -> Self {
        Self::Record(e)
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// A failed compaction: the phase that failed and why.
#[derive(Debug)]
pub struct CompactError {
    pub phase: CompactPhase,
    pub source: PipelineError,
}

impl CompactError {
    #[must_use]
    pub const fn new(phase: CompactPhase, source: PipelineError) -> Self {
        Self { phase, source }
    }
}

impl std::fmt::Display for CompactError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "compaction failed during {}: {}", self.phase, self.source)
    }
}

impl std::error::Error for CompactError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Shape of one rebuilt tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeSummary {
    /// Root as installed in the header; `None` for an empty tree.
    pub root: Option<RootPointer>,
    /// Items added to the leaf level.
    pub items: u64,
    pub leaf_nodes: u64,
    /// Pointer levels above the leaves.
    pub depth: usize,
}

impl TreeSummary {
    /// The root's encoded reduce value, if there is a root.
    #[must_use]
    pub fn reduce(&self) -> Option<&Bytes> {
        self.root.as_ref().map(|root| &root.reduce)
    }
}

/// Outcome of a successful compaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactReport {
    pub documents: u64,
    pub local_documents: u64,
    pub sort: SortStats,
    pub by_seq: TreeSummary,
    pub by_id: TreeSummary,
    pub local_docs: TreeSummary,
    pub update_seq: u64,
    pub purge_seq: u64,
}
