//! Whole-file scans: live documents and per-label history

use std::collections::BTreeMap;

use crate::codec::{decode_snapshot, Compressor};
use crate::error::Result;
use crate::storage::{peek_id, peek_kind, DataRecord, LineScanner, RawLine, Record, RecordKind, HEADER_LEN};

use super::IndexEngine;

/// One superseded version of a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision {
    /// When the superseded version was written (unix millis)
    pub timestamp: u64,
    pub content: String,
}

impl IndexEngine<'_> {
    /// Latest Data record per label across the whole file, soft-deleted
    /// documents included
    pub fn current_documents(&self) -> Result<BTreeMap<String, DataRecord>> {
        let mut documents = BTreeMap::new();

        self.for_each_line(|line| {
            if peek_kind(&line.bytes) != Some(RecordKind::Data) {
                return Ok(());
            }
            if let Record::Data(data) = Record::decode(&line.bytes, line.offset)? {
                documents.insert(data.label.clone(), data);
            }
            Ok(())
        })?;

        Ok(documents)
    }

    /// Every superseded version of `label`, oldest first
    ///
    /// Returns `None` if the file holds no record at all for the label.
    pub fn history(
        &self,
        id: &str,
        label: &str,
        compressor: &dyn Compressor,
    ) -> Result<Option<Vec<Revision>>> {
        let mut seen = false;
        let mut revisions = Vec::new();

        self.for_each_line(|line| {
            if peek_id(&line.bytes) != Some(id.as_bytes()) {
                return Ok(());
            }
            match Record::decode(&line.bytes, line.offset)? {
                Record::History(h) if h.label == label => {
                    seen = true;
                    revisions.push(Revision {
                        timestamp: h.ts,
                        content: decode_snapshot(compressor, &h.snapshot, line.offset)?,
                    });
                }
                Record::Data(d) if d.label == label => seen = true,
                _ => {}
            }
            Ok(())
        })?;

        // Stable: equal timestamps keep write order
        revisions.sort_by_key(|r| r.timestamp);
        Ok(seen.then_some(revisions))
    }

    /// Visit every complete line after the header
    fn for_each_line<F>(&self, mut visit: F) -> Result<()>
    where
        F: FnMut(&RawLine) -> Result<()>,
    {
        let scanner = LineScanner::new(
            self.file,
            HEADER_LEN,
            self.file_len,
            self.read_buffer_size,
            self.max_record_size,
        )?;

        for line in scanner {
            let line = line?;
            if !line.terminated {
                tracing::warn!(offset = line.offset, "ignoring torn record at end of file");
                break;
            }
            visit(&line)?;
        }
        Ok(())
    }
}
