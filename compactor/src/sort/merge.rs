//! K-way merge of sorted runs.
//!
//! A manual min-heap of run indices, ordered by each run's current record.
//! Ties go to the lower run index, so records that compare equal leave the
//! merge in run order.

use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufReader, Write};

use crate::sort::{RecordCodec, SortError};

/// A sorted run being consumed front to back.
struct RunReader {
    reader: BufReader<File>,
    current: Vec<u8>,
}

pub struct KWayMerge<'c, C: RecordCodec> {
    codec: &'c C,
    runs: Vec<RunReader>,
    /// Indices into `runs` of every run that still has a current record.
    heap: Vec<usize>,
    max_record_size: usize,
}

impl<'c, C: RecordCodec> KWayMerge<'c, C> {
    /// Open every run and seed the heap with its first record.
    pub fn new(codec: &'c C, files: Vec<File>, max_record_size: usize) -> Result<Self, SortError> {
        let mut runs = Vec::with_capacity(files.len());
        let mut heap = Vec::with_capacity(files.len());
        for file in files {
            let mut reader = BufReader::new(file);
            let mut current = Vec::new();
            if codec.read_record(&mut reader, &mut current, max_record_size)? {
                heap.push(runs.len());
                runs.push(RunReader { reader, current });
            }
        }

        let mut merge = Self {
            codec,
            runs,
            heap,
            max_record_size,
        };
        if merge.heap.len() > 1 {
            let last_internal = (merge.heap.len() / 2).saturating_sub(1);
            for i in (0..=last_internal).rev() {
                merge.sift_down(i);
            }
        }
        Ok(merge)
    }

    /// Drain every run into `out` in merged order.
    pub fn write_all<W: Write>(mut self, out: &mut W) -> Result<(), SortError> {
        while let Some(&run) = self.heap.first() {
            self.codec.write_record(out, &self.runs[run].current)?;

            let RunReader { reader, current } = &mut self.runs[run];
            if self.codec.read_record(reader, current, self.max_record_size)? {
                self.sift_down(0);
            } else {
                let last = self.heap.len() - 1;
                self.heap.swap(0, last);
                self.heap.pop();
                if !self.heap.is_empty() {
                    self.sift_down(0);
                }
            }
        }
        Ok(())
    }

    fn less(&self, i: usize, j: usize) -> bool {
        let (a, b) = (self.heap[i], self.heap[j]);
        match self.codec.compare(&self.runs[a].current, &self.runs[b].current) {
            Ordering::Less => true,
            Ordering::Greater => false,
            Ordering::Equal => a < b,
        }
    }

    fn sift_down(&mut self, mut pos: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * pos + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let mut smallest = left;
            if right < len && self.less(right, left) {
                smallest = right;
            }
            if !self.less(smallest, pos) {
                break;
            }
            self.heap.swap(pos, smallest);
            pos = smallest;
        }
    }
}
