//! File header
//!
//! Line 1 of every file. It has a fixed byte width and every value is a
//! fixed-width string, so a single field can be overwritten in place without
//! moving any other byte of the file.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::codec::{Compression, HashAlgorithm};
use crate::error::{FlatDocError, Result};

use super::{FORMAT_VERSION, HEADER_LEN, OFFSET_WIDTH};

/// Decoded header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Format version
    pub version: u16,
    /// Algorithm every id in the file was derived with
    pub algorithm: HashAlgorithm,
    /// Compression of History snapshots
    pub compression: Compression,
    /// Sparse region may hold writes not yet reconciled by compaction
    pub dirty: bool,
    /// Writes append History records for superseded content
    pub keep_history: bool,
    /// Timestamp (unix millis) of the most recent write
    pub timestamp: u64,
    /// End of the sorted Index block
    pub index_end: u64,
    /// Start of the sparse region
    pub boundary: u64,
}

/// Individually patchable header fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderField {
    Algorithm,
    Compression,
    Dirty,
    History,
    Timestamp,
    IndexEnd,
    Boundary,
}

impl HeaderField {
    fn key(&self) -> &'static str {
        match self {
            HeaderField::Algorithm => "alg",
            HeaderField::Compression => "zip",
            HeaderField::Dirty => "dirty",
            HeaderField::History => "hist",
            HeaderField::Timestamp => "ts",
            HeaderField::IndexEnd => "idx",
            HeaderField::Boundary => "bnd",
        }
    }

    fn width(&self) -> usize {
        match self {
            HeaderField::Algorithm => HashAlgorithm::FIELD_WIDTH,
            HeaderField::Compression => Compression::FIELD_WIDTH,
            HeaderField::Dirty | HeaderField::History => 1,
            HeaderField::Timestamp | HeaderField::IndexEnd | HeaderField::Boundary => OFFSET_WIDTH,
        }
    }
}

/// On-disk shape; field order is the byte layout
#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct HeaderRepr {
    t: String,
    v: String,
    alg: String,
    zip: String,
    dirty: String,
    hist: String,
    ts: String,
    idx: String,
    bnd: String,
}

const HEADER_TAG: &str = "hdr";

impl Header {
    /// Header of an empty file
    pub fn new(algorithm: HashAlgorithm, compression: Compression, keep_history: bool) -> Self {
        Self {
            version: FORMAT_VERSION,
            algorithm,
            compression,
            dirty: false,
            keep_history,
            timestamp: 0,
            index_end: HEADER_LEN,
            boundary: HEADER_LEN,
        }
    }

    /// Encode to exactly `HEADER_LEN` bytes, newline included
    pub fn encode(&self) -> Result<Vec<u8>> {
        let repr = HeaderRepr {
            t: HEADER_TAG.to_string(),
            v: format!("{:04}", self.version),
            alg: format!("{:<w$}", self.algorithm.as_str(), w = HashAlgorithm::FIELD_WIDTH),
            zip: format!("{:<w$}", self.compression.as_str(), w = Compression::FIELD_WIDTH),
            dirty: flag(self.dirty).to_string(),
            hist: flag(self.keep_history).to_string(),
            ts: format!("{:0w$}", self.timestamp, w = OFFSET_WIDTH),
            idx: format!("{:0w$}", self.index_end, w = OFFSET_WIDTH),
            bnd: format!("{:0w$}", self.boundary, w = OFFSET_WIDTH),
        };

        let mut line = serde_json::to_vec(&repr)?;
        if line.len() >= HEADER_LEN as usize {
            return Err(FlatDocError::RecordTooLarge {
                size: line.len(),
                limit: HEADER_LEN as usize - 1,
            });
        }
        line.resize(HEADER_LEN as usize - 1, b' ');
        line.push(b'\n');
        Ok(line)
    }

    /// Decode a header line (at least `HEADER_LEN` bytes)
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let len = HEADER_LEN as usize;
        if bytes.len() < len {
            return Err(FlatDocError::corrupt(0, format!(
                "header truncated: {} of {} bytes",
                bytes.len(),
                len
            )));
        }
        if bytes[len - 1] != b'\n' {
            return Err(FlatDocError::corrupt(0, "header is not newline terminated"));
        }

        let repr: HeaderRepr = serde_json::from_slice(&bytes[..len - 1])
            .map_err(|e| FlatDocError::corrupt(0, format!("malformed header: {}", e)))?;

        if repr.t != HEADER_TAG {
            return Err(FlatDocError::corrupt(0, format!("unexpected header tag {:?}", repr.t)));
        }

        let version = parse_fixed(&repr.v, 4, "v")? as u16;
        if version != FORMAT_VERSION {
            return Err(FlatDocError::corrupt(0, format!("unsupported format version {}", version)));
        }

        check_width(&repr.alg, HashAlgorithm::FIELD_WIDTH, "alg")?;
        let algorithm = HashAlgorithm::parse(&repr.alg)
            .ok_or_else(|| FlatDocError::corrupt(0, format!("unknown hash algorithm {:?}", repr.alg)))?;

        check_width(&repr.zip, Compression::FIELD_WIDTH, "zip")?;
        let compression = Compression::parse(&repr.zip)
            .ok_or_else(|| FlatDocError::corrupt(0, format!("unknown compression {:?}", repr.zip)))?;

        let header = Self {
            version,
            algorithm,
            compression,
            dirty: parse_flag(&repr.dirty, "dirty")?,
            keep_history: parse_flag(&repr.hist, "hist")?,
            timestamp: parse_fixed(&repr.ts, OFFSET_WIDTH, "ts")?,
            index_end: parse_fixed(&repr.idx, OFFSET_WIDTH, "idx")?,
            boundary: parse_fixed(&repr.bnd, OFFSET_WIDTH, "bnd")?,
        };

        if header.index_end < HEADER_LEN || header.boundary < header.index_end {
            return Err(FlatDocError::corrupt(0, format!(
                "inconsistent region offsets: idx={} bnd={}",
                header.index_end, header.boundary
            )));
        }

        Ok(header)
    }

    /// Read and decode the header at offset 0
    pub fn read(file: &File) -> Result<Self> {
        let mut reader = file;
        reader.seek(SeekFrom::Start(0))?;

        let mut buf = Vec::with_capacity(HEADER_LEN as usize);
        reader.take(HEADER_LEN).read_to_end(&mut buf)?;
        Self::decode(&buf)
    }

    /// Write the whole header line at offset 0
    pub fn write(&self, file: &File, sync: bool) -> Result<()> {
        let mut writer = file;
        writer.seek(SeekFrom::Start(0))?;
        writer.write_all(&self.encode()?)?;
        writer.flush()?;
        if sync {
            file.sync_data()?;
        }
        Ok(())
    }

    /// Overwrite a single field in place with this header's value for it
    ///
    /// Only the field's fixed-width byte range is written; total header
    /// length never changes.
    pub fn patch(&self, file: &File, field: HeaderField, sync: bool) -> Result<()> {
        let line = self.encode()?;
        let range = field_range(&line, field);

        let mut writer = file;
        writer.seek(SeekFrom::Start(range.start as u64))?;
        writer.write_all(&line[range])?;
        writer.flush()?;
        if sync {
            file.sync_data()?;
        }
        Ok(())
    }

    /// Byte range of `field`'s value inside the header line
    pub fn field_range(field: HeaderField) -> Result<Range<usize>> {
        let line = Header::new(HashAlgorithm::default(), Compression::default(), true).encode()?;
        Ok(field_range(&line, field))
    }
}

fn field_range(line: &[u8], field: HeaderField) -> Range<usize> {
    let needle = format!("\"{}\":\"", field.key());
    let start = memchr::memmem::find(line, needle.as_bytes())
        .map(|pos| pos + needle.len())
        .unwrap_or(0);
    start..start + field.width()
}

fn flag(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

fn parse_flag(s: &str, key: &str) -> Result<bool> {
    match s {
        "0" => Ok(false),
        "1" => Ok(true),
        other => Err(FlatDocError::corrupt(0, format!("header field {} is not a flag: {:?}", key, other))),
    }
}

fn check_width(s: &str, width: usize, key: &str) -> Result<()> {
    if s.len() != width {
        return Err(FlatDocError::corrupt(0, format!(
            "header field {} has width {}, expected {}",
            key,
            s.len(),
            width
        )));
    }
    Ok(())
}

fn parse_fixed(s: &str, width: usize, key: &str) -> Result<u64> {
    check_width(s, width, key)?;
    if !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(FlatDocError::corrupt(0, format!("header field {} is not numeric: {:?}", key, s)));
    }
    s.parse()
        .map_err(|_| FlatDocError::corrupt(0, format!("header field {} out of range: {:?}", key, s)))
}
