//! Binary search over the sorted Index block
//!
//! Lines have variable length, so each probe lands on an arbitrary byte,
//! walks back to the start of its line, and decodes that one record.

use std::cmp::Ordering;

use crate::error::{FlatDocError, Result};
use crate::storage::{line_start_at, read_line_at, Record, HEADER_LEN};

use super::{IndexEngine, SortedSearch};

impl IndexEngine<'_> {
    /// Find the Index record for `id` in `[HEADER_LEN, idx)`
    pub fn search_sorted(&self, id: &str, label: &str) -> Result<SortedSearch> {
        let mut lo = HEADER_LEN;
        let mut hi = self.header.index_end;

        if hi > self.file_len {
            return Err(FlatDocError::corrupt(0, format!(
                "sorted index ends at {} but file is {} bytes",
                hi, self.file_len
            )));
        }

        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let start = line_start_at(self.file, lo, mid)?;

            let line = read_line_at(self.file, start, self.max_record_size)?;
            if !line.terminated || line.end() > hi {
                return Err(FlatDocError::corrupt(start, "index line crosses the sorted boundary"));
            }

            let record = match Record::decode(&line.bytes, start)? {
                Record::Index(record) => record,
                _ => {
                    return Err(FlatDocError::corrupt(start, "non-index record inside the sorted index block"));
                }
            };

            match record.id.as_str().cmp(id) {
                Ordering::Equal if record.label == label => {
                    return Ok(SortedSearch::Hit { offset: start, record });
                }
                Ordering::Equal => {
                    tracing::warn!(id, found = %record.label, wanted = label, "id collision in sorted index");
                    return Ok(SortedSearch::Miss { insert_at: start });
                }
                Ordering::Less => lo = line.end(),
                Ordering::Greater => hi = start,
            }
        }

        Ok(SortedSearch::Miss { insert_at: lo })
    }
}
