//! Canonical file writer
//!
//! Produces header + Index block sorted by id + Data block + History block.
//! Afterwards the sparse region is empty (`bnd == EOF`) and the dirty flag
//! is clear. Parameterized by the id function, which is all Rehash needs.

use std::io::Write;

use crate::codec::IdHasher;
use crate::error::Result;
use crate::storage::{Header, IndexRecord, Record, HEADER_LEN};
use crate::writer::check_record_size;

use super::DocumentState;

/// Summary of a rewrite
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompactionStats {
    /// Labels with a Data record in the output
    pub documents: usize,
    /// Of those, documents that are not soft-deleted
    pub live_documents: usize,
    /// History records in the output
    pub history_records: usize,
    pub bytes_before: u64,
    pub bytes_after: u64,
}

pub struct Compactor<'a> {
    hasher: &'a dyn IdHasher,
    keep_history: bool,
    max_record_size: usize,
}

impl<'a> Compactor<'a> {
    /// `keep_history = false` is Purge: History and soft-deleted documents
    /// are dropped
    pub fn new(hasher: &'a dyn IdHasher, keep_history: bool, max_record_size: usize) -> Self {
        Self {
            hasher,
            keep_history,
            max_record_size,
        }
    }

    /// Write the canonical form of `documents` to `out`
    ///
    /// `template` supplies the fields that survive a rewrite (compression,
    /// history flag, timestamp). Returns the header that was written.
    pub fn write<W: Write + ?Sized>(
        &self,
        documents: Vec<DocumentState>,
        template: &Header,
        out: &mut W,
    ) -> Result<(Header, CompactionStats)> {
        let mut entries: Vec<(String, DocumentState)> = documents
            .into_iter()
            .filter_map(|mut doc| {
                if !self.keep_history {
                    if !doc.is_live() {
                        return None;
                    }
                    doc.history.clear();
                }
                Some((self.hasher.id(&doc.label), doc))
            })
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.label.cmp(&b.1.label)));

        let mut stats = CompactionStats::default();
        let mut latest_ts = template.timestamp;

        let mut data_lines: Vec<Vec<u8>> = Vec::new();
        let mut history_lines: Vec<Vec<u8>> = Vec::new();
        // (id, label, position of the Data line within data_lines)
        let mut pointers: Vec<(String, String, usize)> = Vec::new();

        for (id, doc) in entries {
            if let Some(mut data) = doc.data {
                stats.documents += 1;
                if !data.is_deleted() {
                    stats.live_documents += 1;
                }
                latest_ts = latest_ts.max(data.ts);
                data.id = id.clone();
                pointers.push((id.clone(), doc.label.clone(), data_lines.len()));
                data_lines.push(self.line(&Record::Data(data))?);
            }

            for mut history in doc.history {
                stats.history_records += 1;
                history.id = id.clone();
                history_lines.push(self.line(&Record::History(history))?);
            }
        }

        // Offsets are fixed width, so the Index block size is known up front
        let mut index_len = 0u64;
        for (id, label, _) in &pointers {
            index_len += self.index_line(id, label, 0)?.len() as u64;
        }

        let index_end = HEADER_LEN + index_len;
        let mut data_offsets = Vec::with_capacity(data_lines.len());
        let mut cursor = index_end;
        for line in &data_lines {
            data_offsets.push(cursor);
            cursor += line.len() as u64;
        }
        let boundary = cursor + history_lines.iter().map(|l| l.len() as u64).sum::<u64>();

        let header = Header {
            algorithm: self.hasher.algorithm(),
            dirty: false,
            timestamp: latest_ts,
            index_end,
            boundary,
            ..template.clone()
        };

        out.write_all(&header.encode()?)?;
        for (id, label, position) in &pointers {
            out.write_all(&self.index_line(id, label, data_offsets[*position])?)?;
        }
        for line in data_lines.iter().chain(history_lines.iter()) {
            out.write_all(line)?;
        }
        out.flush()?;

        stats.bytes_after = boundary;
        Ok((header, stats))
    }

    fn index_line(&self, id: &str, label: &str, offset: u64) -> Result<Vec<u8>> {
        self.line(&Record::Index(IndexRecord {
            id: id.to_string(),
            offset,
            label: label.to_string(),
        }))
    }

    fn line(&self, record: &Record) -> Result<Vec<u8>> {
        let line = record.encode()?;
        check_record_size(&line, self.max_record_size)?;
        Ok(line)
    }
}
