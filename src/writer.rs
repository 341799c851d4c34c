//! Write Protocol
//!
//! Append-only mutation of one file. Callers hold the exclusive lock.
//!
//! ## `set(label, content)`
//! 1. Resolve the current Index entry (sorted search, else sparse scan)
//! 2. If the current version has content, append a History record with the
//!    old content and its original timestamp
//! 3. Append the new Data record
//! 4. Sorted-region entry: patch its fixed-width `off` field in place.
//!    Sparse or missing entry: append a new Index record (the sparse scan's
//!    last-match rule makes it authoritative)
//! 5. Patch the header timestamp
//!
//! The dirty flag is raised before the first append, so a crash can never
//! leave unreconciled sparse records behind a clean header.
//!
//! `delete(label)` is the same path with empty content (soft delete).

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use crate::bloom::BloomFilter;
use crate::codec::{encode_snapshot, Compressor, IdHasher};
use crate::config::Config;
use crate::error::{FlatDocError, Result};
use crate::index::{IndexEngine, Region, Resolution};
use crate::storage::{
    file_len, has_clean_tail, now_millis, DataRecord, Header, HeaderField, HistoryRecord,
    IndexRecord, Record, INDEX_OFFSET_POS,
};

/// What a single write did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    pub id: String,
    /// Offset of the new Data record
    pub data_offset: u64,
    /// The label had no prior record
    pub created: bool,
    /// A sorted-region Index record was patched instead of appending one
    pub patched: bool,
    /// A History record was appended
    pub history_written: bool,
    /// File length after the write
    pub file_len: u64,
}

pub(crate) struct WriteProtocol<'a> {
    pub(crate) file: &'a File,
    pub(crate) header: &'a mut Header,
    pub(crate) hasher: &'a dyn IdHasher,
    pub(crate) compressor: &'a dyn Compressor,
    pub(crate) config: &'a Config,
    pub(crate) bloom: Option<&'a BloomFilter>,
}

impl WriteProtocol<'_> {
    /// Write `content` as the new version of `label`
    pub fn set(&mut self, label: &str, content: &str) -> Result<WriteOutcome> {
        let (id, len, current) = self.prepare(label)?;
        self.write(label, content, id, len, current)
    }

    /// Soft-delete `label`; `NotFound` if it is absent or already deleted
    pub fn delete(&mut self, label: &str) -> Result<WriteOutcome> {
        let (id, len, current) = self.prepare(label)?;
        if current.as_ref().and_then(Resolution::content).is_none() {
            return Err(FlatDocError::NotFound(label.to_string()));
        }
        self.write(label, "", id, len, current)
    }

    fn prepare(&self, label: &str) -> Result<(String, u64, Option<Resolution>)> {
        validate_label(label)?;

        let id = self.hasher.id(label);
        let len = file_len(self.file)?;
        if !has_clean_tail(self.file, len)? {
            return Err(FlatDocError::corrupt(len, "file ends with a torn record; run repair before writing"));
        }

        let current = IndexEngine::new(
            self.file,
            &*self.header,
            len,
            self.config.read_buffer_size,
            self.config.max_record_size,
        )
        .with_bloom(self.bloom)
        .resolve(&id, label)?;

        Ok((id, len, current))
    }

    fn write(
        &mut self,
        label: &str,
        content: &str,
        id: String,
        len: u64,
        current: Option<Resolution>,
    ) -> Result<WriteOutcome> {
        let sync = self.config.sync_writes;
        let ts = now_millis().max(self.header.timestamp);

        let mut batch = Vec::new();
        let mut history_written = false;

        if let Some(previous) = &current {
            if self.header.keep_history && !previous.data.is_deleted() {
                let history = Record::History(HistoryRecord {
                    id: id.clone(),
                    label: label.to_string(),
                    ts: previous.data.ts,
                    snapshot: encode_snapshot(self.compressor, &previous.data.content)?,
                });
                self.push_line(&mut batch, &history)?;
                history_written = true;
            }
        }

        let data_offset = len + batch.len() as u64;
        let data = Record::Data(DataRecord {
            id: id.clone(),
            label: label.to_string(),
            ts,
            content: content.to_string(),
        });
        self.push_line(&mut batch, &data)?;

        let patch_target = match &current {
            Some(r) if r.region == Region::Sorted => r.index_offset,
            _ => None,
        };
        if patch_target.is_none() {
            let index = Record::Index(IndexRecord {
                id: id.clone(),
                offset: data_offset,
                label: label.to_string(),
            });
            self.push_line(&mut batch, &index)?;
        }

        if !self.header.dirty {
            self.header.dirty = true;
            self.header.patch(self.file, HeaderField::Dirty, sync)?;
        }

        let mut writer = self.file;
        writer.seek(SeekFrom::Start(len))?;
        writer.write_all(&batch)?;
        writer.flush()?;

        if let Some(index_offset) = patch_target {
            self.patch_index_offset(index_offset, &id, data_offset)?;
        }
        if sync {
            self.file.sync_data()?;
        }

        self.header.timestamp = ts;
        self.header.patch(self.file, HeaderField::Timestamp, sync)?;

        let outcome = WriteOutcome {
            id,
            data_offset,
            created: current.is_none(),
            patched: patch_target.is_some(),
            history_written,
            file_len: len + batch.len() as u64,
        };

        tracing::debug!(
            label,
            id = %outcome.id,
            data_offset,
            created = outcome.created,
            patched = outcome.patched,
            deleted = content.is_empty(),
            "write applied"
        );
        Ok(outcome)
    }

    /// Overwrite the `off` field of the Index record at `index_offset`
    fn patch_index_offset(&self, index_offset: u64, id: &str, data_offset: u64) -> Result<()> {
        let expected = format!(r#"{{"t":"i","id":"{}","off":""#, id);
        debug_assert_eq!(expected.len(), INDEX_OFFSET_POS);

        let mut file = self.file;
        let mut prefix = vec![0u8; expected.len()];
        file.seek(SeekFrom::Start(index_offset))?;
        file.read_exact(&mut prefix)?;
        if prefix != expected.as_bytes() {
            return Err(FlatDocError::corrupt(index_offset, "index record changed underneath a patch"));
        }

        file.seek(SeekFrom::Start(IndexRecord::offset_field_position(index_offset)))?;
        file.write_all(IndexRecord::encode_offset(data_offset).as_bytes())?;
        file.flush()?;
        Ok(())
    }

    fn push_line(&self, batch: &mut Vec<u8>, record: &Record) -> Result<()> {
        let line = record.encode()?;
        check_record_size(&line, self.config.max_record_size)?;
        batch.extend_from_slice(&line);
        Ok(())
    }
}

/// Reject lines longer than the configured maximum (newline excluded)
pub(crate) fn check_record_size(line: &[u8], limit: usize) -> Result<()> {
    let size = line.len().saturating_sub(1);
    if size > limit {
        return Err(FlatDocError::RecordTooLarge { size, limit });
    }
    Ok(())
}

pub(crate) fn validate_label(label: &str) -> Result<()> {
    if label.is_empty() {
        return Err(FlatDocError::InvalidLabel("label must not be empty".to_string()));
    }
    Ok(())
}
