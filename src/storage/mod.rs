//! Storage Module
//!
//! The file format: a fixed-width header line followed by one JSON record
//! per line.
//!
//! ## Responsibilities
//! - Read, write and patch the header in place
//! - Encode/decode Index, Data and History records
//! - Raw line I/O (scans, single reads, line-start search)
//!
//! ## File Layout
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ Header (256 bytes, space padded, '\n' terminated)        │
//! │   v | alg | zip | dirty | hist | ts | idx | bnd          │
//! ├──────────────────────────────────────────────────────────┤ HEADER_LEN
//! │ Sorted Index block (one Index record per id, by id)      │
//! ├──────────────────────────────────────────────────────────┤ idx
//! │ Data block, then History block (compacted, by id)        │
//! ├──────────────────────────────────────────────────────────┤ bnd
//! │ Sparse region: Index/Data/History appended since the     │
//! │ last compaction, in write order                          │
//! └──────────────────────────────────────────────────────────┘ EOF
//! ```

mod header;
mod lines;
mod record;

use std::time::{SystemTime, UNIX_EPOCH};

pub use header::{Header, HeaderField};
pub use lines::{file_len, has_clean_tail, line_start_at, read_line_at, LineScanner, RawLine};
pub use record::{
    peek_id, peek_kind, DataRecord, HistoryRecord, IndexRecord, Record, RecordKind, ID_POS,
    INDEX_OFFSET_POS,
};

// =============================================================================
// Shared Constants
// =============================================================================

/// Current format version
pub const FORMAT_VERSION: u16 = 1;

/// Header width in bytes, newline included
pub const HEADER_LEN: u64 = 256;

/// Width of every fixed-width numeric field (fits any u64)
pub const OFFSET_WIDTH: usize = 20;

/// Current time in unix millis
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
