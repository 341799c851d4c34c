//! Line records
//!
//! Every line after the header is exactly one record. Decoding is strictly
//! per line: a line that is not a complete object with a known `t` and all
//! required fields is corrupt, and says nothing about its neighbours.

use serde::{Deserialize, Serialize};

use crate::codec::{is_valid_id, ID_WIDTH};
use crate::error::{FlatDocError, Result};

use super::OFFSET_WIDTH;

/// One line of the file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Record {
    /// Pointer from an id to its current Data record
    #[serde(rename = "i")]
    Index(IndexRecord),

    /// A written version of a document
    #[serde(rename = "d")]
    Data(DataRecord),

    /// Compressed snapshot of a superseded version
    #[serde(rename = "h")]
    History(HistoryRecord),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRecord {
    pub id: String,

    /// Byte offset of the current Data record (fixed width, patchable)
    #[serde(rename = "off", with = "fixed_offset")]
    pub offset: u64,

    #[serde(rename = "l")]
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataRecord {
    pub id: String,

    #[serde(rename = "l")]
    pub label: String,

    /// Write time (unix millis)
    pub ts: u64,

    /// Plaintext content; empty means soft-deleted
    #[serde(rename = "c")]
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub id: String,

    #[serde(rename = "l")]
    pub label: String,

    /// Timestamp of the superseded write
    pub ts: u64,

    /// base64(compress(content))
    #[serde(rename = "z")]
    pub snapshot: String,
}

/// Record discriminant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Index,
    Data,
    History,
}

// =============================================================================
// Fixed Positions
// =============================================================================

const TAG_PREFIX: &[u8] = br#"{"t":""#;
const ID_PREFIX: &[u8] = br#"","id":""#;

/// Byte position of the tag character within a record line
const TAG_POS: usize = TAG_PREFIX.len();

/// Byte position of the id within any record line
pub const ID_POS: usize = TAG_POS + 1 + ID_PREFIX.len();

/// Byte position of the `off` value within an Index line
pub const INDEX_OFFSET_POS: usize = ID_POS + ID_WIDTH + r#"","off":""#.len();

impl Record {
    /// Encode as one newline-terminated line
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut line = serde_json::to_vec(self)?;
        line.push(b'\n');
        Ok(line)
    }

    /// Decode one line (trailing newline optional). `offset` is where the
    /// line starts and is only used for error reporting.
    pub fn decode(line: &[u8], offset: u64) -> Result<Self> {
        let body = line.strip_suffix(b"\n").unwrap_or(line);
        let record: Record = serde_json::from_slice(body)
            .map_err(|e| FlatDocError::corrupt(offset, format!("undecodable record: {}", e)))?;

        if !is_valid_id(record.id()) {
            return Err(FlatDocError::corrupt(offset, format!("malformed id {:?}", record.id())));
        }
        if record.label().is_empty() {
            return Err(FlatDocError::corrupt(offset, "record has an empty label"));
        }

        Ok(record)
    }

    pub fn id(&self) -> &str {
        match self {
            Record::Index(r) => &r.id,
            Record::Data(r) => &r.id,
            Record::History(r) => &r.id,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Record::Index(r) => &r.label,
            Record::Data(r) => &r.label,
            Record::History(r) => &r.label,
        }
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Index(_) => RecordKind::Index,
            Record::Data(_) => RecordKind::Data,
            Record::History(_) => RecordKind::History,
        }
    }
}

impl DataRecord {
    pub fn is_deleted(&self) -> bool {
        self.content.is_empty()
    }
}

impl IndexRecord {
    /// File position of the `off` value for an Index record at `record_offset`
    pub fn offset_field_position(record_offset: u64) -> u64 {
        record_offset + INDEX_OFFSET_POS as u64
    }

    /// Fixed-width rendering of an offset value
    pub fn encode_offset(offset: u64) -> String {
        format!("{:0w$}", offset, w = OFFSET_WIDTH)
    }
}

// =============================================================================
// Cheap Peeks (no full decode)
// =============================================================================

/// Kind of a line, judged from its fixed prefix only
pub fn peek_kind(line: &[u8]) -> Option<RecordKind> {
    if !line.starts_with(TAG_PREFIX) || line.len() <= TAG_POS {
        return None;
    }
    match line[TAG_POS] {
        b'i' => Some(RecordKind::Index),
        b'd' => Some(RecordKind::Data),
        b'h' => Some(RecordKind::History),
        _ => None,
    }
}

/// Id bytes of a line, judged from its fixed prefix only
pub fn peek_id(line: &[u8]) -> Option<&[u8]> {
    peek_kind(line)?;
    if line.len() < ID_POS + ID_WIDTH || &line[TAG_POS + 1..ID_POS] != ID_PREFIX {
        return None;
    }
    Some(&line[ID_POS..ID_POS + ID_WIDTH])
}

mod fixed_offset {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::OFFSET_WIDTH;

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{:0w$}", value, w = OFFSET_WIDTH))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        let s = String::deserialize(deserializer)?;
        if s.len() != OFFSET_WIDTH || !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(D::Error::custom(format!("offset {:?} is not {} digits", s, OFFSET_WIDTH)));
        }
        s.parse().map_err(D::Error::custom)
    }
}
