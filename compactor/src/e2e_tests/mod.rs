//! End-to-end compaction scenarios.
//!
//! Each test file covers a specific scenario, building a source store with
//! deterministic contents, compacting it, and reading the result back
//! through the same store interface the host engine would use.

#![cfg(test)]

mod helpers;

mod test_deletion_accounting;
mod test_empty_store;
mod test_failure_injection;
mod test_five_documents;
mod test_large_sort;
mod test_local_docs;
mod test_reopen;
