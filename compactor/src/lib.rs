// Life of a compaction:
// 1. Walk the old by-sequence index in sequence order
// 2. For each document:
//     - Copy its body into the new file
//     - Add a by-sequence leaf item
//     - Append a by-id record to a temporary file
// 3. Build the by-sequence tree bottom-up
// 4. Sort the temporary file by document id (external merge sort)
// 5. Build the by-id tree bottom-up from the sorted records
// 6. Copy local documents and header counters, then commit
//
// System components:
//  - Term codec (node and value encoding)
//  - Bulk tree builder with reduce values
//  - External merge sort
//  - Store file and the store interface the pipeline runs against

// Test code is allowed to use unwrap() and expect() for convenience.
#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod btree;
pub mod compact;
pub mod config;
pub mod simulation;
pub mod sort;
pub mod storage;
pub mod term;
pub mod types;

#[cfg(test)]
mod testing;

mod e2e_tests;

pub use compact::{CompactError, CompactReport, Compactor, compact_file};
pub use config::CompactConfig;
