//! Compacting a store file into `<path>.compact`.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::compact::{CompactError, CompactPhase, CompactReport, Compactor, PipelineError};
use crate::config::CompactConfig;
use crate::storage::{StorageError, StoreFile};

/// Path of the file a compaction of `path` writes.
#[must_use]
pub fn compact_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".compact");
    PathBuf::from(name)
}

/// Compact the store file at `path` into a new file at `<path>.compact`.
///
/// The source file is only read. The temporary record file lives in
/// `config.temp_directory_for(path)` and is removed when this returns. On
/// failure the partially written `<path>.compact` is removed as well; an
/// output file that already existed beforehand is never touched.
///
/// # Errors
///
/// Failing to open the source or create the output is reported as a scan
/// failure.
pub fn compact_file(path: &Path, config: &CompactConfig) -> Result<CompactReport, CompactError> {
    let opening = |e: StorageError| {
        CompactError::new(CompactPhase::ScanningSequenceIndex, PipelineError::Storage(e))
    };
    let target_path = compact_path(path);
    let temp_dir = config.temp_directory_for(path);

    info!(
        source = %path.display(),
        target = %target_path.display(),
        "compacting store file"
    );
    let source = StoreFile::open(path).map_err(opening)?;
    let mut target = StoreFile::create(&target_path).map_err(opening)?;

    let result = tempfile::Builder::new()
        .prefix("compact-records")
        .tempfile_in(&temp_dir)
        .map_err(|e| opening(StorageError::Io(e)))
        .and_then(|mut records| {
            Compactor::new(config.clone())
                .with_temp_dir(&temp_dir)
                .run(&source, &mut target, records.as_file_mut())
        })
        .and_then(|report| {
            target
                .close()
                .map(|()| report)
                .map_err(|e| CompactError::new(CompactPhase::Committed, PipelineError::Storage(e)))
        });

    if let Err(error) = &result {
        warn!(
            phase = %error.phase,
            path = %target_path.display(),
            "removing partial compaction output"
        );
        if let Err(e) = std::fs::remove_file(&target_path) {
            warn!(error = %e, path = %target_path.display(), "failed to remove partial output");
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_compact_path() {
        assert_eq!(
            compact_path(Path::new("/data/db.couch")),
            PathBuf::from("/data/db.couch.compact")
        );
    }

    #[test]
    fn test_missing_source() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("missing.couch");

        let error = compact_file(&path, &CompactConfig::default()).expect_err("no source");
        assert_eq!(error.phase, CompactPhase::ScanningSequenceIndex);
        assert!(!compact_path(&path).exists());
    }

    #[test]
    fn test_existing_output_left_alone() {
        let dir = tempdir().expect("create temp dir");
        let path = dir.path().join("db.couch");
        StoreFile::create(&path).expect("create").close().expect("close");
        std::fs::write(compact_path(&path), b"keep me").expect("write");

        let error = compact_file(&path, &CompactConfig::default()).expect_err("output exists");
        assert!(matches!(
            error.source,
            PipelineError::Storage(StorageError::AlreadyExists(_))
        ));
        assert_eq!(
            std::fs::read(compact_path(&path)).expect("read"),
            b"keep me"
        );
    }
}
