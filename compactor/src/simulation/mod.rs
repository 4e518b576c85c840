//! Deterministic simulation infrastructure.
//!
//! This module provides an in-memory store with fault injection so the
//! compaction pipeline can be driven through every failure path without
//! touching the filesystem.
//!
//! # Design Principles
//!
//! 1. All host engine I/O goes through the `Store` trait and can be simulated
//! 2. All randomness is seeded for reproducibility
//! 3. Faults can be injected at any I/O boundary
//!
//! # Usage
//!
//! ```ignore
//! use compactor::simulation::{FaultConfig, SimulatedStore};
//!
//! let mut target = SimulatedStore::with_config(12345, FaultConfig::failing_after(10));
//! let result = Compactor::new(config).run(&source, &mut target, records);
//! assert!(result.is_err());
//! ```

mod store;

pub use store::{FaultConfig, SimulatedStore, SimulatedStoreStats};
