//! Raw line I/O
//!
//! Sequential scans, single-line reads at an offset, and backward search for
//! a line start (used by binary search over variable-length lines).

use std::cmp::min;
use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom};

use crate::error::{FlatDocError, Result};

/// Chunk size for backward newline search
const BACKSCAN_CHUNK: u64 = 4096;

/// One line as stored, without its newline
#[derive(Debug, Clone)]
pub struct RawLine {
    /// Offset of the first byte of the line
    pub offset: u64,
    pub bytes: Vec<u8>,
    /// False for a torn final line (no newline before EOF)
    pub terminated: bool,
}

impl RawLine {
    /// Offset just past this line
    pub fn end(&self) -> u64 {
        self.offset + self.bytes.len() as u64 + u64::from(self.terminated)
    }
}

/// Forward line reader over `[start, end)`
pub struct LineScanner<'a> {
    reader: BufReader<&'a File>,
    offset: u64,
    end: u64,
    max_record_size: usize,
    failed: bool,
}

impl<'a> LineScanner<'a> {
    pub fn new(
        file: &'a File,
        start: u64,
        end: u64,
        buffer_size: usize,
        max_record_size: usize,
    ) -> Result<Self> {
        let mut reader = BufReader::with_capacity(buffer_size.max(64), file);
        reader.seek(SeekFrom::Start(start))?;
        Ok(Self {
            reader,
            offset: start,
            end,
            max_record_size,
            failed: false,
        })
    }

    /// Current position (start of the next line)
    pub fn position(&self) -> u64 {
        self.offset
    }

    /// Read the next line
    ///
    /// Returns `Corrupt` for a line longer than the maximum record size.
    pub fn next_line(&mut self) -> Result<Option<RawLine>> {
        if self.offset >= self.end {
            return Ok(None);
        }

        let remaining = self.end - self.offset;
        let limit = min(remaining, self.max_record_size as u64 + 1);

        let mut bytes = Vec::new();
        let n = (&mut self.reader).take(limit).read_until(b'\n', &mut bytes)? as u64;
        if n == 0 {
            return Ok(None);
        }

        let offset = self.offset;
        self.offset += n;

        let terminated = bytes.last() == Some(&b'\n');
        if terminated {
            bytes.pop();
        } else if n == limit && limit < remaining {
            return Err(FlatDocError::corrupt(offset, format!(
                "record exceeds maximum size of {} bytes",
                self.max_record_size
            )));
        }

        Ok(Some(RawLine {
            offset,
            bytes,
            terminated,
        }))
    }
}

impl Iterator for LineScanner<'_> {
    type Item = Result<RawLine>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let item = self.next_line().transpose();
        if matches!(item, Some(Err(_))) {
            self.failed = true;
        }
        item
    }
}

/// Read the single line starting at `offset`
pub fn read_line_at(file: &File, offset: u64, max_record_size: usize) -> Result<RawLine> {
    let buffer = min(max_record_size + 1, 8 * 1024);
    let mut scanner = LineScanner::new(file, offset, u64::MAX, buffer, max_record_size)?;
    scanner
        .next_line()?
        .ok_or_else(|| FlatDocError::corrupt(offset, "offset points past end of file"))
}

/// Start of the line containing byte `pos`, never before `floor`
///
/// `floor` must itself be a line start.
pub fn line_start_at(file: &File, floor: u64, pos: u64) -> Result<u64> {
    let mut reader = file;
    let mut end = pos;

    while end > floor {
        let start = end.saturating_sub(BACKSCAN_CHUNK).max(floor);
        let mut buf = vec![0u8; (end - start) as usize];
        reader.seek(SeekFrom::Start(start))?;
        reader.read_exact(&mut buf)?;

        if let Some(i) = memchr::memrchr(b'\n', &buf) {
            return Ok(start + i as u64 + 1);
        }
        end = start;
    }

    Ok(floor)
}

/// Current length of the file
pub fn file_len(file: &File) -> Result<u64> {
    Ok(file.metadata()?.len())
}

/// True if the file is empty or its last byte is a newline
pub fn has_clean_tail(file: &File, len: u64) -> Result<bool> {
    if len == 0 {
        return Ok(true);
    }
    let mut reader = file;
    let mut last = [0u8; 1];
    reader.seek(SeekFrom::Start(len - 1))?;
    reader.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}
