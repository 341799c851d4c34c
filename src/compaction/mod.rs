//! Compaction Module
//!
//! Whole-file rewrites: Compact, Purge, Rehash and Repair all read records,
//! reconcile them per label, and publish a canonical file.
//!
//! ## Publishing
//! Output goes to a temporary file in the same directory, is fsynced, and
//! then renamed over the original. Readers see either the old file or the
//! new one, never a half-written one.

mod compactor;
mod reconcile;
mod repair;

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::config::Config;
use crate::error::{FlatDocError, Result};
use crate::storage::{LineScanner, Record, HEADER_LEN};

pub use compactor::{CompactionStats, Compactor};
pub use reconcile::{DocumentState, Reconciler};
pub use repair::{scan_valid_prefix, RepairReport, ValidPrefix};

/// Read every record after the header, failing on the first bad line
pub fn load_records(file: &File, file_len: u64, config: &Config) -> Result<Reconciler> {
    let mut reconciler = Reconciler::new();
    let scanner = LineScanner::new(
        file,
        HEADER_LEN,
        file_len,
        config.read_buffer_size,
        config.max_record_size,
    )?;

    for line in scanner {
        let line = line?;
        if !line.terminated {
            return Err(FlatDocError::corrupt(line.offset, "torn record at end of file; run repair"));
        }
        reconciler.absorb(Record::decode(&line.bytes, line.offset)?);
    }

    Ok(reconciler)
}

/// Write a replacement for `path` through `fill`, then swap it in atomically
pub fn publish<T, F>(path: &Path, fill: F) -> Result<T>
where
    F: FnOnce(&mut dyn Write) -> Result<T>,
{
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut staged = tempfile::Builder::new()
        .prefix(".flatdoc-")
        .suffix(".tmp")
        .tempfile_in(dir)?;

    let value = {
        let mut writer = BufWriter::new(staged.as_file_mut());
        let value = fill(&mut writer)?;
        writer.flush()?;
        value
    };
    staged.as_file().sync_all()?;

    if let Ok(metadata) = fs::metadata(path) {
        fs::set_permissions(staged.path(), metadata.permissions())?;
    }
    staged.persist(path).map_err(|e| FlatDocError::Io(e.error))?;

    #[cfg(unix)]
    File::open(dir)?.sync_all()?;

    Ok(value)
}
