//! Bounded-memory external merge sort.
//!
//! Records are variable-length byte strings whose framing is owned by a
//! [`RecordCodec`]. The sorter reads the input in blocks of at most
//! `block_size` records, sorts each block in memory and spills it to an
//! anonymous temporary file (a "run"). Runs are then merged `merge_fan_in` at
//! a time until at most `merge_fan_in` remain, and the final merge writes
//! straight to the output.
//!
//! Input that fits in a single block never touches the temporary directory.

mod merge;

use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use merge::KWayMerge;

/// Default number of records sorted in memory per run.
pub const DEFAULT_BLOCK_SIZE: usize = 10_000;

/// Default upper bound on a single record's size in bytes.
pub const DEFAULT_MAX_RECORD_SIZE: usize = 1024;

/// Default number of runs merged in one step.
pub const DEFAULT_MERGE_FAN_IN: usize = 16;

/// Framing and ordering of the records being sorted.
pub trait RecordCodec {
    /// Read the next record into `buf`, replacing its contents.
    ///
    /// Returns `Ok(false)` when the input is exhausted on a record boundary.
    /// A record longer than `max_record_size` is an error, never truncated.
    fn read_record<R: Read>(
        &self,
        reader: &mut R,
        buf: &mut Vec<u8>,
        max_record_size: usize,
    ) -> Result<bool, SortError>;

    /// Write one record previously produced by `read_record`.
    fn write_record<W: Write>(&self, writer: &mut W, record: &[u8]) -> Result<(), SortError> {
        writer.write_all(record)?;
        Ok(())
    }

    /// Order two records.
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;
}

/// Fill `buf` completely, or report a clean end of input.
///
/// Returns `Ok(false)` if the reader was already at EOF, and
/// `SortError::TruncatedRecord` if it ran dry part way through.
pub fn fill_or_eof<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<bool, SortError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => {
                return Err(SortError::TruncatedRecord {
                    expected: buf.len(),
                    actual: filled,
                });
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(SortError::Io(e)),
        }
    }
    Ok(true)
}

/// Counters describing one sort.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SortStats {
    /// Records read (and written).
    pub records: u64,
    /// Sorted runs produced from the input.
    pub runs: usize,
    /// Merge passes over the data, the final merge included.
    pub merge_passes: usize,
}

/// External merge sorter.
#[derive(Debug, Clone)]
pub struct ExternalSorter {
    block_size: usize,
    max_record_size: usize,
    merge_fan_in: usize,
    temp_dir: PathBuf,
}

impl ExternalSorter {
    /// Create a sorter that spills runs into `temp_dir`.
    pub fn new(
        block_size: usize,
        max_record_size: usize,
        merge_fan_in: usize,
        temp_dir: &Path,
    ) -> Result<Self, SortError> {
        if block_size == 0 {
            return Err(SortError::InvalidConfig("block size must be at least 1"));
        }
        if max_record_size == 0 {
            return Err(SortError::InvalidConfig(
                "maximum record size must be at least 1",
            ));
        }
        if merge_fan_in < 2 {
            return Err(SortError::InvalidConfig("merge fan-in must be at least 2"));
        }
        Ok(Self {
            block_size,
            max_record_size,
            merge_fan_in,
            temp_dir: temp_dir.to_path_buf(),
        })
    }

    #[must_use]
    pub const fn max_record_size(&self) -> usize {
        self.max_record_size
    }

    /// Sort every record of `input` into `output`.
    pub fn sort<C, R, W>(&self, codec: &C, input: R, output: W) -> Result<SortStats, SortError>
    where
        C: RecordCodec,
        R: Read,
        W: Write,
    {
        let mut input = BufReader::new(input);
        let mut output = BufWriter::new(output);
        let mut stats = SortStats::default();
        let mut runs: Vec<File> = Vec::new();
        let mut block: Vec<Vec<u8>> = Vec::with_capacity(self.block_size.min(1024));

        loop {
            let mut record = Vec::new();
            if !codec.read_record(&mut input, &mut record, self.max_record_size)? {
                break;
            }
            stats.records += 1;
            block.push(record);
            if block.len() == self.block_size {
                runs.push(self.spill_run(codec, &mut block)?);
            }
        }

        if runs.is_empty() {
            block.sort_by(|a, b| codec.compare(a, b));
            for record in &block {
                codec.write_record(&mut output, record)?;
            }
            output.flush()?;
            stats.runs = usize::from(!block.is_empty());
            debug!(records = stats.records, "sorted in memory");
            return Ok(stats);
        }

        if !block.is_empty() {
            runs.push(self.spill_run(codec, &mut block)?);
        }
        stats.runs = runs.len();

        while runs.len() > self.merge_fan_in {
            let mut merged = Vec::with_capacity(runs.len().div_ceil(self.merge_fan_in));
            let mut pending = runs.into_iter().peekable();
            while pending.peek().is_some() {
                let group: Vec<File> = pending.by_ref().take(self.merge_fan_in).collect();
                let mut run = tempfile::tempfile_in(&self.temp_dir)?;
                {
                    let mut writer = BufWriter::new(&mut run);
                    KWayMerge::new(codec, group, self.max_record_size)?.write_all(&mut writer)?;
                    writer.flush()?;
                }
                run.seek(SeekFrom::Start(0))?;
                merged.push(run);
            }
            runs = merged;
            stats.merge_passes += 1;
            debug!(
                pass = stats.merge_passes,
                runs = runs.len(),
                "merged intermediate runs"
            );
        }

        KWayMerge::new(codec, runs, self.max_record_size)?.write_all(&mut output)?;
        output.flush()?;
        stats.merge_passes += 1;
        debug!(
            records = stats.records,
            runs = stats.runs,
            passes = stats.merge_passes,
            "external sort complete"
        );
        Ok(stats)
    }

    /// Sort a file's records in place.
    ///
    /// The file is read from the start and rewritten with the sorted records;
    /// its length does not change.
    pub fn sort_file<C: RecordCodec>(&self, codec: &C, file: &mut File) -> Result<SortStats, SortError> {
        file.seek(SeekFrom::Start(0))?;
        let mut sorted = tempfile::tempfile_in(&self.temp_dir)?;
        let stats = self.sort(codec, &mut *file, &mut sorted)?;

        sorted.seek(SeekFrom::Start(0))?;
        file.seek(SeekFrom::Start(0))?;
        file.set_len(0)?;
        std::io::copy(&mut sorted, file)?;
        file.flush()?;
        file.seek(SeekFrom::Start(0))?;
        Ok(stats)
    }

    fn spill_run<C: RecordCodec>(
        &self,
        codec: &C,
        block: &mut Vec<Vec<u8>>,
    ) -> Result<File, SortError> {
        block.sort_by(|a, b| codec.compare(a, b));
        let mut run = tempfile::tempfile_in(&self.temp_dir)?;
        {
            let mut writer = BufWriter::new(&mut run);
            for record in block.iter() {
                codec.write_record(&mut writer, record)?;
            }
            writer.flush()?;
        }
        run.seek(SeekFrom::Start(0))?;
        debug!(records = block.len(), "spilled sorted run");
        block.clear();
        Ok(run)
    }
}

/// Errors that can occur while sorting.
#[derive(Debug)]
pub enum SortError {
    /// I/O error on the input, output or a run file.
    Io(std::io::Error),
    /// A record's declared length exceeds the configured maximum.
    RecordTooLarge { len: usize, max: usize },
    /// The input ended part way through a record.
    TruncatedRecord { expected: usize, actual: usize },
    /// The codec rejected a record.
    Codec(Box<dyn std::error::Error + Send + Sync>),
    /// Sorter parameters are out of range.
    InvalidConfig(&'static str),
}

impl std::fmt::Display for SortError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::RecordTooLarge { len, max } => {
                write!(f, "record of {len} bytes exceeds maximum of {max}")
            }
            Self::TruncatedRecord { expected, actual } => write!(
                f,
                "truncated record: expected {expected} bytes, got {actual}"
            ),
            Self::Codec(e) => write!(f, "malformed record: {e}"),
            Self::InvalidConfig(msg) => write!(f, "invalid sort configuration: {msg}"),
        }
    }
}

impl std::error::Error for SortError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Codec(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SortError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};
    use tempfile::tempdir;

    /// Length-prefixed byte strings ordered by content.
    struct PrefixedCodec;

    impl RecordCodec for PrefixedCodec {
        fn read_record<R: Read>(
            &self,
            reader: &mut R,
            buf: &mut Vec<u8>,
            max_record_size: usize,
        ) -> Result<bool, SortError> {
            let mut len = [0u8; 2];
            if !fill_or_eof(reader, &mut len)? {
                return Ok(false);
            }
            let len = usize::from(u16::from_le_bytes(len));
            if len + 2 > max_record_size {
                return Err(SortError::RecordTooLarge {
                    len: len + 2,
                    max: max_record_size,
                });
            }
            buf.clear();
            buf.extend_from_slice(&u16::try_from(len).expect("len fits").to_le_bytes());
            buf.resize(len + 2, 0);
            if !fill_or_eof(reader, &mut buf[2..])? && len > 0 {
                return Err(SortError::TruncatedRecord {
                    expected: len,
                    actual: 0,
                });
            }
            Ok(true)
        }

        fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
            a[2..].cmp(&b[2..])
        }
    }

    fn encode(records: &[Vec<u8>]) -> Vec<u8> {
        let mut out = Vec::new();
        for record in records {
            out.extend_from_slice(&u16::try_from(record.len()).expect("fits").to_le_bytes());
            out.extend_from_slice(record);
        }
        out
    }

    fn decode(mut bytes: &[u8]) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        while !bytes.is_empty() {
            let len = usize::from(u16::from_le_bytes([bytes[0], bytes[1]]));
            out.push(bytes[2..2 + len].to_vec());
            bytes = &bytes[2 + len..];
        }
        out
    }

    fn random_keys(rng: &mut StdRng, count: usize) -> Vec<Vec<u8>> {
        (0..count)
            .map(|i| {
                let mut key = format!("{i:06}").into_bytes();
                key.shuffle(rng);
                let extra = rng.random_range(0..4);
                key.extend((0..extra).map(|_| rng.random_range(b'a'..=b'z')));
                key
            })
            .collect()
    }

    #[test]
    fn test_sort_in_memory() {
        let dir = tempdir().expect("create temp dir");
        let sorter = ExternalSorter::new(100, 64, 4, dir.path()).expect("sorter");
        let input = encode(&[b"pear".to_vec(), b"apple".to_vec(), b"fig".to_vec()]);

        let mut output = Vec::new();
        let stats = sorter
            .sort(&PrefixedCodec, input.as_slice(), &mut output)
            .expect("sort");

        assert_eq!(
            decode(&output),
            vec![b"apple".to_vec(), b"fig".to_vec(), b"pear".to_vec()]
        );
        assert_eq!(stats.records, 3);
        assert_eq!(stats.runs, 1);
        assert_eq!(stats.merge_passes, 0);
    }

    #[test]
    fn test_sort_empty_input() {
        let dir = tempdir().expect("create temp dir");
        let sorter = ExternalSorter::new(4, 64, 2, dir.path()).expect("sorter");

        let mut output = Vec::new();
        let stats = sorter
            .sort(&PrefixedCodec, std::io::empty(), &mut output)
            .expect("sort");

        assert!(output.is_empty());
        assert_eq!(stats, SortStats::default());
    }

    #[test]
    fn test_multi_pass_merge() {
        let dir = tempdir().expect("create temp dir");
        let mut rng = StdRng::seed_from_u64(7);
        let keys = random_keys(&mut rng, 1000);
        // 1000 / 7 = 143 runs; fan-in 3 needs several passes.
        let sorter = ExternalSorter::new(7, 64, 3, dir.path()).expect("sorter");

        let mut output = Vec::new();
        let stats = sorter
            .sort(&PrefixedCodec, encode(&keys).as_slice(), &mut output)
            .expect("sort");

        let mut expected = keys;
        expected.sort();
        assert_eq!(decode(&output), expected);
        assert_eq!(stats.records, 1000);
        assert_eq!(stats.runs, 143);
        assert!(stats.merge_passes >= 4);
    }

    #[test]
    fn test_sort_across_configurations() {
        let dir = tempdir().expect("create temp dir");
        let mut rng = StdRng::seed_from_u64(0x5eed);

        for _ in 0..20 {
            let count = rng.random_range(0..300);
            let block_size = rng.random_range(1..50);
            let fan_in = rng.random_range(2..6);
            let keys = random_keys(&mut rng, count);
            let sorter = ExternalSorter::new(block_size, 64, fan_in, dir.path()).expect("sorter");

            let mut output = Vec::new();
            sorter
                .sort(&PrefixedCodec, encode(&keys).as_slice(), &mut output)
                .expect("sort");

            let mut expected = keys;
            expected.sort();
            assert_eq!(decode(&output), expected, "block {block_size} fan-in {fan_in}");
        }
    }

    #[test]
    fn test_prefix_sorts_first() {
        let dir = tempdir().expect("create temp dir");
        let sorter = ExternalSorter::new(1, 64, 2, dir.path()).expect("sorter");
        let input = encode(&[b"abc".to_vec(), b"ab".to_vec(), b"abcd".to_vec(), b"a".to_vec()]);

        let mut output = Vec::new();
        sorter
            .sort(&PrefixedCodec, input.as_slice(), &mut output)
            .expect("sort");

        assert_eq!(
            decode(&output),
            vec![b"a".to_vec(), b"ab".to_vec(), b"abc".to_vec(), b"abcd".to_vec()]
        );
    }

    #[test]
    fn test_record_too_large() {
        let dir = tempdir().expect("create temp dir");
        let sorter = ExternalSorter::new(4, 8, 2, dir.path()).expect("sorter");
        let input = encode(&[b"ok".to_vec(), b"much too long".to_vec()]);

        let result = sorter.sort(&PrefixedCodec, input.as_slice(), &mut Vec::new());
        assert!(matches!(
            result,
            Err(SortError::RecordTooLarge { len: 15, max: 8 })
        ));
    }

    #[test]
    fn test_truncated_input() {
        let dir = tempdir().expect("create temp dir");
        let sorter = ExternalSorter::new(4, 64, 2, dir.path()).expect("sorter");
        let mut input = encode(&[b"whole".to_vec()]);
        input.push(9);

        let result = sorter.sort(&PrefixedCodec, input.as_slice(), &mut Vec::new());
        assert!(matches!(result, Err(SortError::TruncatedRecord { .. })));
    }

    #[test]
    fn test_sort_file_in_place() {
        let dir = tempdir().expect("create temp dir");
        let sorter = ExternalSorter::new(2, 64, 2, dir.path()).expect("sorter");
        let keys: Vec<Vec<u8>> = ["d", "b", "e", "a", "c"]
            .iter()
            .map(|k| k.as_bytes().to_vec())
            .collect();

        let mut file = tempfile::tempfile_in(dir.path()).expect("temp file");
        file.write_all(&encode(&keys)).expect("write input");
        let stats = sorter.sort_file(&PrefixedCodec, &mut file).expect("sort");
        assert_eq!(stats.runs, 3);

        let mut sorted = Vec::new();
        file.read_to_end(&mut sorted).expect("read back");
        let expected: Vec<Vec<u8>> = [b"a", b"b", b"c", b"d", b"e"]
            .iter()
            .map(|k| k.to_vec())
            .collect();
        assert_eq!(decode(&sorted), expected);
    }

    #[test]
    fn test_invalid_config() {
        let dir = tempdir().expect("create temp dir");
        assert!(matches!(
            ExternalSorter::new(0, 64, 2, dir.path()),
            Err(SortError::InvalidConfig(_))
        ));
        assert!(matches!(
            ExternalSorter::new(10, 64, 1, dir.path()),
            Err(SortError::InvalidConfig(_))
        ));
    }
}
