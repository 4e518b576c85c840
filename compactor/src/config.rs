//! Compaction configuration module.
//!
//! This module provides configuration loading for the compactor from
//! environment variables.
//!
//! # Environment Variables
//!
//! - `COMPACT_CHUNK_THRESHOLD`: Node size in bytes above which a node is flushed (default: `1279`)
//! - `COMPACT_SORT_BLOCK_SIZE`: Records sorted in memory per run (default: `10000`)
//! - `COMPACT_MAX_RECORD_SIZE`: Largest temporary-file record accepted by the sort (default: `1024`)
//! - `COMPACT_MERGE_FAN_IN`: Sorted runs merged at once (default: `16`)
//! - `COMPACT_TEMP_DIRECTORY`: Where temporary files go (default: next to the file being compacted)
//!
//! # Invariants
//!
//! - every numeric setting is at least 1
//! - `merge_fan_in` is at least 2

use std::path::{Path, PathBuf};

use crate::btree::DEFAULT_CHUNK_THRESHOLD;
use crate::sort::{DEFAULT_BLOCK_SIZE, DEFAULT_MAX_RECORD_SIZE, DEFAULT_MERGE_FAN_IN};

/// Compaction configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactConfig {
    /// Node flush threshold in bytes. Advisory: a single larger item still
    /// gets a node of its own.
    pub chunk_threshold: usize,
    /// Records per in-memory sort run.
    pub sort_block_size: usize,
    /// Maximum temporary-file record size in bytes.
    pub max_record_size: usize,
    /// Runs merged per merge step.
    pub merge_fan_in: usize,
    /// Directory for the temporary record file and sort runs. `None` means
    /// the directory of the file being compacted.
    pub temp_directory: Option<PathBuf>,
}

/// Error returned when loading configuration fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    InvalidValue { name: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl Default for CompactConfig {
    fn default() -> Self {
        Self {
            chunk_threshold: DEFAULT_CHUNK_THRESHOLD,
            sort_block_size: DEFAULT_BLOCK_SIZE,
            max_record_size: DEFAULT_MAX_RECORD_SIZE,
            merge_fan_in: DEFAULT_MERGE_FAN_IN,
            temp_directory: None,
        }
    }
}

impl CompactConfig {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but is not a positive integer
    /// (or, for `COMPACT_MERGE_FAN_IN`, is less than 2).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`, which returns a variable's value
    /// if it is set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            chunk_threshold: load_usize(&lookup, "COMPACT_CHUNK_THRESHOLD", defaults.chunk_threshold, 1)?,
            sort_block_size: load_usize(&lookup, "COMPACT_SORT_BLOCK_SIZE", defaults.sort_block_size, 1)?,
            max_record_size: load_usize(&lookup, "COMPACT_MAX_RECORD_SIZE", defaults.max_record_size, 1)?,
            merge_fan_in: load_usize(&lookup, "COMPACT_MERGE_FAN_IN", defaults.merge_fan_in, 2)?,
            temp_directory: lookup("COMPACT_TEMP_DIRECTORY")
                .filter(|value| !value.is_empty())
                .map(PathBuf::from),
        })
    }

    #[must_use]
    pub const fn with_chunk_threshold(mut self, chunk_threshold: usize) -> Self {
        self.chunk_threshold = chunk_threshold;
        self
    }

    #[must_use]
    pub const fn with_sort_block_size(mut self, sort_block_size: usize) -> Self {
        self.sort_block_size = sort_block_size;
        self
    }

    #[must_use]
    pub const fn with_max_record_size(mut self, max_record_size: usize) -> Self {
        self.max_record_size = max_record_size;
        self
    }

    #[must_use]
    pub const fn with_merge_fan_in(mut self, merge_fan_in: usize) -> Self {
        self.merge_fan_in = merge_fan_in;
        self
    }

    #[must_use]
    pub fn with_temp_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_directory = Some(dir.into());
        self
    }

    /// Directory for temporary files when compacting `path`.
    #[must_use]
    pub fn temp_directory_for(&self, path: &Path) -> PathBuf {
        if let Some(dir) = &self.temp_directory {
            return dir.clone();
        }
        match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }
}

/// Load a numeric setting, falling back to `default` when unset.
///
/// # Errors
///
/// Returns an error if the value is not an integer or is below `min`.
fn load_usize<F>(lookup: &F, name: &str, default: usize, min: usize) -> Result<usize, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(value) = lookup(name) else {
        return Ok(default);
    };
    let parsed = value.trim().parse::<usize>().map_err(|_| ConfigError::InvalidValue {
        name: name.to_string(),
        message: format!("'{value}' is not a valid integer"),
    })?;
    if parsed < min {
        return Err(ConfigError::InvalidValue {
            name: name.to_string(),
            message: format!("must be at least {min}, got {parsed}"),
        });
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_default_values() {
        let config = CompactConfig::from_lookup(lookup(&[])).expect("defaults");
        assert_eq!(config, CompactConfig::default());
        assert_eq!(config.chunk_threshold, 1279);
        assert_eq!(config.sort_block_size, 10_000);
        assert_eq!(config.max_record_size, 1024);
        assert_eq!(config.merge_fan_in, 16);
        assert!(config.temp_directory.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = CompactConfig::from_lookup(lookup(&[
            ("COMPACT_CHUNK_THRESHOLD", "64"),
            ("COMPACT_SORT_BLOCK_SIZE", " 5 "),
            ("COMPACT_MERGE_FAN_IN", "2"),
            ("COMPACT_TEMP_DIRECTORY", "/var/tmp"),
        ]))
        .expect("config");
        assert_eq!(config.chunk_threshold, 64);
        assert_eq!(config.sort_block_size, 5);
        assert_eq!(config.merge_fan_in, 2);
        assert_eq!(config.temp_directory, Some(PathBuf::from("/var/tmp")));
    }

    #[test]
    fn test_invalid_values() {
        let result = CompactConfig::from_lookup(lookup(&[("COMPACT_CHUNK_THRESHOLD", "big")]));
        assert_eq!(
            result,
            Err(ConfigError::InvalidValue {
                name: "COMPACT_CHUNK_THRESHOLD".to_string(),
                message: "'big' is not a valid integer".to_string(),
            })
        );

        let result = CompactConfig::from_lookup(lookup(&[("COMPACT_SORT_BLOCK_SIZE", "0")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));

        let result = CompactConfig::from_lookup(lookup(&[("COMPACT_MERGE_FAN_IN", "1")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_temp_directory_for() {
        let config = CompactConfig::default();
        assert_eq!(
            config.temp_directory_for(Path::new("/data/db.couch")),
            PathBuf::from("/data")
        );
        assert_eq!(
            config.temp_directory_for(Path::new("db.couch")),
            PathBuf::from(".")
        );

        let config = config.with_temp_directory("/scratch");
        assert_eq!(
            config.temp_directory_for(Path::new("/data/db.couch")),
            PathBuf::from("/scratch")
        );
    }

    #[test]
    fn test_config_error_display_invalid() {
        let error = ConfigError::InvalidValue {
            name: "TEST_VAR".to_string(),
            message: "bad value".to_string(),
        };
        assert_eq!(error.to_string(), "invalid value for TEST_VAR: bad value");
    }
}
