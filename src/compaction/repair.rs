//! Repair scan
//!
//! Decode forward from the header. The first line that is not one complete,
//! well-formed record is the corruption boundary: everything before it is
//! kept, it and everything after it is discarded.

use std::fs::File;

use crate::config::Config;
use crate::error::{FlatDocError, Result};
use crate::storage::{Header, LineScanner, Record, HEADER_LEN};

/// Result of a repair (or verify) scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairReport {
    /// Records decoded before the corruption boundary
    pub records_recovered: u64,
    /// Offset of the first bad line, if any
    pub corrupt_offset: Option<u64>,
    /// Bytes from the boundary to end of file
    pub bytes_discarded: u64,
    /// The header itself was unreadable and is rebuilt from configuration
    pub header_rebuilt: bool,
}

impl RepairReport {
    /// Nothing to discard and the header is intact
    pub fn is_clean(&self) -> bool {
        self.corrupt_offset.is_none() && !self.header_rebuilt
    }
}

/// Valid records plus the header to rebuild with
pub struct ValidPrefix {
    pub header: Header,
    pub records: Vec<Record>,
    pub report: RepairReport,
}

/// Scan `file` and keep the longest prefix of well-formed records
pub fn scan_valid_prefix(file: &File, file_len: u64, config: &Config) -> Result<ValidPrefix> {
    let mut report = RepairReport::default();

    let header = match Header::read(file) {
        Ok(header) => header,
        Err(FlatDocError::Corrupt { reason, .. }) => {
            tracing::warn!(%reason, "header unreadable, rebuilding from configuration");
            report.header_rebuilt = true;
            Header::new(config.hash_algorithm, config.compression, config.keep_history)
        }
        Err(e) => return Err(e),
    };

    let mut records = Vec::new();
    if file_len > HEADER_LEN {
        let mut scanner = LineScanner::new(
            file,
            HEADER_LEN,
            file_len,
            config.read_buffer_size,
            config.max_record_size,
        )?;

        loop {
            let line = match scanner.next_line() {
                Ok(Some(line)) => line,
                Ok(None) => break,
                Err(FlatDocError::Corrupt { offset, reason }) => {
                    tracing::warn!(offset, %reason, "corruption boundary");
                    report.corrupt_offset = Some(offset);
                    break;
                }
                Err(e) => return Err(e),
            };

            if !line.terminated {
                tracing::warn!(offset = line.offset, "torn record at end of file");
                report.corrupt_offset = Some(line.offset);
                break;
            }

            match Record::decode(&line.bytes, line.offset) {
                Ok(record) => records.push(record),
                Err(FlatDocError::Corrupt { offset, reason }) => {
                    tracing::warn!(offset, %reason, "corruption boundary");
                    report.corrupt_offset = Some(offset);
                    break;
                }
                Err(e) => return Err(e),
            }
        }
    }

    report.records_recovered = records.len() as u64;
    report.bytes_discarded = report
        .corrupt_offset
        .map(|offset| file_len.saturating_sub(offset))
        .unwrap_or(0);

    Ok(ValidPrefix {
        header,
        records,
        report,
    })
}
