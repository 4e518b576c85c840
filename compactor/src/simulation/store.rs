//! Simulated in-memory store for deterministic testing.
//!
//! This module provides an in-memory implementation of the `Store` trait
//! with support for fault injection:
//! - Chunk read/write errors at a configurable rate
//! - Commit failures
//! - A hard failure after a fixed number of successful writes

use std::cell::RefCell;
use std::collections::BTreeMap;

use bytes::Bytes;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::storage::{CHUNK_PREFIX_SIZE, HEADER_SIZE, Header, Store, StorageError};

/// Configuration for fault injection.
#[derive(Debug, Clone, Default)]
pub struct FaultConfig {
    /// Probability of a read error (0.0 - 1.0).
    pub read_error_rate: f64,
    /// Probability of a write error (0.0 - 1.0).
    pub write_error_rate: f64,
    /// Probability of a commit error (0.0 - 1.0).
    pub commit_error_rate: f64,
    /// Fail every write after this many have succeeded.
    pub fail_after_writes: Option<u64>,
}

impl FaultConfig {
    /// Create a fault config with no faults (for baseline testing).
    #[must_use]
    pub fn no_faults() -> Self {
        Self::default()
    }

    /// Create a fault config that lets `writes` writes through and fails the
    /// rest.
    #[must_use]
    pub fn failing_after(writes: u64) -> Self {
        Self {
            fail_after_writes: Some(writes),
            ..Self::default()
        }
    }
}

/// Statistics about simulated store operations.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SimulatedStoreStats {
    /// Number of chunk reads.
    pub reads: u64,
    /// Number of chunk writes.
    pub writes: u64,
    /// Payload bytes written.
    pub bytes_written: u64,
    /// Number of commits.
    pub commits: u64,
    /// Number of injected read errors.
    pub injected_read_errors: u64,
    /// Number of injected write errors.
    pub injected_write_errors: u64,
    /// Number of injected commit errors.
    pub injected_commit_errors: u64,
}

/// In-memory store for deterministic testing.
///
/// Chunks get the same offsets a `StoreFile` would assign, so trees built
/// here look exactly like trees built on disk.
///
/// # Thread Safety
///
/// This implementation is not thread-safe. Reads take `&self`, so the RNG and
/// statistics live in `RefCell`s.
#[derive(Debug)]
pub struct SimulatedStore {
    chunks: BTreeMap<u64, Bytes>,
    next_offset: u64,
    header: Header,
    /// Header as of the last successful commit.
    committed: Option<Header>,
    fault_config: FaultConfig,
    rng: RefCell<StdRng>,
    stats: RefCell<SimulatedStoreStats>,
}

impl SimulatedStore {
    /// Create a new simulated store with the given seed.
    ///
    /// The seed ensures deterministic behavior: the same seed will produce
    /// the same sequence of faults.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self::with_config(seed, FaultConfig::default())
    }

    /// Create a new simulated store with custom fault configuration.
    #[must_use]
    pub fn with_config(seed: u64, fault_config: FaultConfig) -> Self {
        Self {
            chunks: BTreeMap::new(),
            next_offset: HEADER_SIZE as u64,
            header: Header::new(),
            committed: None,
            fault_config,
            rng: RefCell::new(StdRng::seed_from_u64(seed)),
            stats: RefCell::new(SimulatedStoreStats::default()),
        }
    }

    /// Get a snapshot of the current statistics.
    #[must_use]
    pub fn stats(&self) -> SimulatedStoreStats {
        self.stats.borrow().clone()
    }

    /// Update the fault configuration.
    pub fn set_fault_config(&mut self, config: FaultConfig) {
        self.fault_config = config;
    }

    /// The header as of the last successful commit.
    #[must_use]
    pub const fn committed_header(&self) -> Option<&Header> {
        self.committed.as_ref()
    }

    /// Number of chunks written.
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Check if a fault should be injected based on the given rate.
    fn should_inject_fault(&self, rate: f64) -> bool {
        if rate <= 0.0 {
            return false;
        }
        self.rng.borrow_mut().random::<f64>() < rate
    }
}

impl Store for SimulatedStore {
    fn write_raw(&mut self, bytes: &[u8]) -> Result<u64, StorageError> {
        let mut stats = self.stats.borrow_mut();
        if self
            .fault_config
            .fail_after_writes
            .is_some_and(|limit| stats.writes >= limit)
        {
            stats.injected_write_errors += 1;
            return Err(StorageError::InjectedFault(
                "simulated write error".to_string(),
            ));
        }
        drop(stats);

        if self.should_inject_fault(self.fault_config.write_error_rate) {
            self.stats.borrow_mut().injected_write_errors += 1;
            return Err(StorageError::InjectedFault(
                "simulated write error".to_string(),
            ));
        }

        let offset = self.next_offset;
        self.chunks.insert(offset, Bytes::copy_from_slice(bytes));
        self.next_offset += CHUNK_PREFIX_SIZE + bytes.len() as u64;

        let mut stats = self.stats.borrow_mut();
        stats.writes += 1;
        stats.bytes_written += bytes.len() as u64;
        Ok(offset)
    }

    fn read_raw(&self, offset: u64) -> Result<Bytes, StorageError> {
        self.stats.borrow_mut().reads += 1;

        if self.should_inject_fault(self.fault_config.read_error_rate) {
            self.stats.borrow_mut().injected_read_errors += 1;
            return Err(StorageError::InjectedFault(
                "simulated read error".to_string(),
            ));
        }

        self.chunks
            .get(&offset)
            .cloned()
            .ok_or(StorageError::ChunkOutOfBounds {
                offset,
                file_size: self.next_offset,
            })
    }

    fn header(&self) -> &Header {
        &self.header
    }

    fn header_mut(&mut self) -> &mut Header {
        &mut self.header
    }

    fn commit(&mut self) -> Result<(), StorageError> {
        if self.should_inject_fault(self.fault_config.commit_error_rate) {
            self.stats.borrow_mut().injected_commit_errors += 1;
            return Err(StorageError::InjectedFault(
                "simulated commit error".to_string(),
            ));
        }
        // Same size limits as the on-disk header.
        self.header.to_bytes()?;
        self.committed = Some(self.header.clone());
        self.stats.borrow_mut().commits += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::RootPointer;

    #[test]
    fn test_simulated_store_basic() {
        let mut store = SimulatedStore::new(12345);

        let first = store.write_raw(b"hello world").expect("write");
        let second = store.write_raw(b"again").expect("write");
        assert_eq!(first, HEADER_SIZE as u64);
        assert_eq!(second, first + CHUNK_PREFIX_SIZE + 11);

        assert_eq!(store.read_raw(first).expect("read").as_ref(), b"hello world");
        assert!(matches!(
            store.read_raw(first + 1),
            Err(StorageError::ChunkOutOfBounds { .. })
        ));
        assert_eq!(store.stats().writes, 2);
        assert_eq!(store.stats().bytes_written, 16);
        assert_eq!(store.chunk_count(), 2);
    }

    #[test]
    fn test_commit_snapshots_header() {
        let mut store = SimulatedStore::new(12345);
        assert!(store.committed_header().is_none());

        store.set_update_seq(42);
        store.set_by_id_root(Some(RootPointer {
            offset: 4096,
            reduce: Bytes::from_static(&[106]),
            subtree_size: 10,
        }));
        store.commit().expect("commit");
        store.set_update_seq(43);

        let committed = store.committed_header().expect("committed");
        assert_eq!(committed.update_seq, 42);
        assert!(committed.by_id_root.is_some());
        assert_eq!(store.header().update_seq, 43);
    }

    #[test]
    fn test_fail_after_writes() {
        let mut store = SimulatedStore::with_config(1, FaultConfig::failing_after(2));
        store.write_raw(b"a").expect("first write");
        store.write_raw(b"b").expect("second write");
        assert!(matches!(
            store.write_raw(b"c"),
            Err(StorageError::InjectedFault(_))
        ));
        assert_eq!(store.stats().injected_write_errors, 1);
        assert_eq!(store.chunk_count(), 2);
    }

    #[test]
    fn test_fault_injection_is_deterministic() {
        let config = FaultConfig {
            write_error_rate: 0.3,
            ..FaultConfig::default()
        };
        let outcomes = |seed| {
            let mut store = SimulatedStore::with_config(seed, config.clone());
            (0..50)
                .map(|_| store.write_raw(b"x").is_ok())
                .collect::<Vec<_>>()
        };

        let first = outcomes(99);
        assert_eq!(first, outcomes(99));
        assert!(first.iter().any(|ok| !ok));
        assert!(first.iter().any(|ok| *ok));
    }

    #[test]
    fn test_commit_fault() {
        let config = FaultConfig {
            commit_error_rate: 1.0,
            ..FaultConfig::default()
        };
        let mut store = SimulatedStore::with_config(1, config);
        assert!(store.commit().is_err());
        assert!(store.committed_header().is_none());
        assert_eq!(store.stats().injected_commit_errors, 1);
    }
}
