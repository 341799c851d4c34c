//! Index Engine
//!
//! The lookup core every other operation builds on.
//!
//! ## Lookup Order
//! 1. Binary search the sorted Index block `[HEADER_LEN, idx)`: O(log n)
//! 2. On a miss, consult the Bloom filter (if any); a negative is final
//! 3. Otherwise scan the whole sparse region `[bnd, EOF)`: O(k) where k is
//!    the number of records written since the last compaction. The scan
//!    never stops early; the highest-offset match wins.
//! 4. Follow the Index pointer to the Data record. Empty content means the
//!    document is soft-deleted.
//!
//! A sorted hit still checks the sparse region (bloom permitting) for a
//! Data record written after the pointer target. A crash between the Data
//! append and the `off` patch leaves exactly that state, and the later
//! record is the current version.

mod documents;
mod sorted;
mod sparse;

use std::fs::File;

use crate::bloom::BloomFilter;
use crate::error::{FlatDocError, Result};
use crate::storage::{read_line_at, DataRecord, Header, IndexRecord, Record};

pub use documents::Revision;
pub use sparse::build_bloom;

/// Which lookup strategy resolved a label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Sorted,
    Sparse,
}

/// Outcome of the sorted-region binary search
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SortedSearch {
    /// Index record found at `offset`
    Hit { offset: u64, record: IndexRecord },

    /// Not present; `insert_at` is where it would sort
    Miss { insert_at: u64 },
}

/// Where a label currently resolves to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub region: Region,
    /// Offset of the authoritative Index record. `None` when the sparse
    /// region holds a Data record whose Index was never written.
    pub index_offset: Option<u64>,
    pub data_offset: u64,
    pub data: DataRecord,
}

impl Resolution {
    /// Live content, or `None` if soft-deleted
    pub fn content(&self) -> Option<&str> {
        (!self.data.is_deleted()).then_some(self.data.content.as_str())
    }
}

/// Read-side view of one file for the duration of a locked operation
pub struct IndexEngine<'a> {
    pub(crate) file: &'a File,
    pub(crate) header: &'a Header,
    pub(crate) bloom: Option<&'a BloomFilter>,
    pub(crate) file_len: u64,
    pub(crate) read_buffer_size: usize,
    pub(crate) max_record_size: usize,
}

impl<'a> IndexEngine<'a> {
    pub fn new(
        file: &'a File,
        header: &'a Header,
        file_len: u64,
        read_buffer_size: usize,
        max_record_size: usize,
    ) -> Self {
        Self {
            file,
            header,
            bloom: None,
            file_len,
            read_buffer_size,
            max_record_size,
        }
    }

    /// Attach a Bloom filter for negative sparse lookups
    pub fn with_bloom(mut self, bloom: Option<&'a BloomFilter>) -> Self {
        self.bloom = bloom;
        self
    }

    /// Resolve `label` (whose id is `id`) to its current Data record
    pub fn resolve(&self, id: &str, label: &str) -> Result<Option<Resolution>> {
        match self.search_sorted(id, label)? {
            SortedSearch::Hit { offset, record } => {
                let (data_offset, data) = match self.newer_sparse_data(id, label, record.offset)? {
                    Some(newer) => newer,
                    None => (record.offset, self.read_data(record.offset, id)?),
                };
                return Ok(Some(Resolution {
                    region: Region::Sorted,
                    index_offset: Some(offset),
                    data_offset,
                    data,
                }));
            }
            SortedSearch::Miss { insert_at } => {
                tracing::trace!(id, insert_at, "sorted region miss");
            }
        }

        if !self.sparse_may_contain(id) {
            tracing::trace!(id, "sparse region cannot hold id");
            return Ok(None);
        }

        self.scan_sparse(id, label)
    }

    /// False only when the sparse region certainly holds nothing for `id`
    fn sparse_may_contain(&self, id: &str) -> bool {
        self.header.boundary < self.file_len
            && self.bloom.map_or(true, |bloom| bloom.may_contain(id.as_bytes()))
    }

    /// Current content of `label`; `None` if absent or soft-deleted
    pub fn lookup(&self, id: &str, label: &str) -> Result<Option<String>> {
        Ok(self
            .resolve(id, label)?
            .and_then(|r| r.content().map(str::to_string)))
    }

    /// Read the Data record an Index pointer refers to
    pub(crate) fn read_data(&self, offset: u64, id: &str) -> Result<DataRecord> {
        if offset >= self.file_len {
            return Err(FlatDocError::corrupt(offset, "index points past end of file"));
        }

        let line = read_line_at(self.file, offset, self.max_record_size)?;
        if !line.terminated {
            return Err(FlatDocError::corrupt(offset, "index points at a torn record"));
        }

        match Record::decode(&line.bytes, offset)? {
            Record::Data(data) if data.id == id => Ok(data),
            Record::Data(data) => Err(FlatDocError::corrupt(offset, format!(
                "index for {} points at data for {}",
                id, data.id
            ))),
            _ => Err(FlatDocError::corrupt(offset, "index points at a non-data record")),
        }
    }
}
