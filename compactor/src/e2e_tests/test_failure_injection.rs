//! Failures abort the run, name the failing phase and never commit.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::compact::{CompactPhase, PipelineError, compact_file, compact_path};
use crate::e2e_tests::helpers::{Fixture, low_threshold};
use crate::simulation::{FaultConfig, SimulatedStore};
use crate::storage::{StorageError, StoreFile};
use crate::testing::{SourceDoc, populate};

fn docs(n: u32) -> Vec<SourceDoc> {
    (0..n)
        .map(|i| SourceDoc::new(&format!("id-{:03}", (i * 37) % n), i + 1))
        .collect()
}

#[test]
fn test_every_write_failure_is_reported() {
    let fixture = Fixture::new(&docs(30), &[("_local/a", "x"), ("_local/b", "y")]);

    let mut clean = SimulatedStore::new(2);
    fixture
        .compact_into(low_threshold(), &mut clean)
        .expect("clean run");
    let total_writes = clean.stats().writes;

    let mut last_phase = CompactPhase::ScanningSequenceIndex;
    for allowed in 0..total_writes {
        let mut target = SimulatedStore::with_config(2, FaultConfig::failing_after(allowed));
        let error = fixture
            .compact_into(low_threshold(), &mut target)
            .expect_err("write fails");

        assert!(matches!(
            error.source,
            PipelineError::Storage(StorageError::InjectedFault(_))
                | PipelineError::Node(crate::btree::NodeError::Storage(
                    StorageError::InjectedFault(_)
                ))
        ));
        assert!(error.phase >= last_phase, "phases go backwards at {allowed}");
        assert!(error.phase <= CompactPhase::CopyingAuxiliaryState);
        assert!(target.committed_header().is_none());
        last_phase = error.phase;
    }
    // The last write belongs to the local documents tree.
    assert_eq!(last_phase, CompactPhase::CopyingAuxiliaryState);

    let mut target = SimulatedStore::with_config(2, FaultConfig::failing_after(total_writes));
    fixture
        .compact_into(low_threshold(), &mut target)
        .expect("enough writes");
}

#[test]
fn test_first_write_fails_in_scan() {
    let fixture = Fixture::new(&docs(5), &[]);
    let mut target = SimulatedStore::with_config(2, FaultConfig::failing_after(0));

    let error = fixture
        .compact_into(low_threshold(), &mut target)
        .expect_err("write fails");
    assert_eq!(error.phase, CompactPhase::ScanningSequenceIndex);
    assert!(error.to_string().contains("during scan"));
}

#[test]
fn test_random_read_faults() {
    let mut rng = StdRng::seed_from_u64(0xC0FFEE);
    let mut failures = 0;

    for _ in 0..20 {
        let mut source = SimulatedStore::with_config(rng.random(), FaultConfig::no_faults());
        let infos = populate(&mut source, &docs(40), &[], 64).expect("populate");
        source.set_fault_config(FaultConfig {
            read_error_rate: 0.02,
            ..FaultConfig::default()
        });

        let dir = tempfile::tempdir().expect("create temp dir");
        let mut records = tempfile::tempfile_in(dir.path()).expect("records");
        let mut target = SimulatedStore::new(rng.random());
        let result = crate::compact::Compactor::new(low_threshold())
            .with_temp_dir(dir.path())
            .run(&source, &mut target, &mut records);

        match result {
            Ok(report) => {
                assert_eq!(report.documents, infos.len() as u64);
                assert!(target.committed_header().is_some());
            }
            Err(error) => {
                failures += 1;
                assert!(target.committed_header().is_none());
                assert!(error.phase <= CompactPhase::CopyingAuxiliaryState);
            }
        }
    }
    assert!(failures > 0);
}

#[test]
fn test_failed_file_compaction_removes_output() {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("db.couch");
    let mut source = StoreFile::create(&path).expect("create source");
    let long_id = "k".repeat(300);
    populate(&mut source, &[SourceDoc::new(&long_id, 1)], &[], 64).expect("populate");
    source.close().expect("close source");
    let source_bytes = std::fs::read(&path).expect("read source");

    let config = low_threshold()
        .with_max_record_size(128)
        .with_temp_directory(dir.path());
    let error = compact_file(&path, &config).expect_err("record too large");

    assert_eq!(error.phase, CompactPhase::SortingKeyRecords);
    assert!(!compact_path(&path).exists());
    assert_eq!(std::fs::read(&path).expect("read source"), source_bytes);
    // Only the source is left behind.
    let leftovers = std::fs::read_dir(dir.path()).expect("list").count();
    assert_eq!(leftovers, 1);
}
