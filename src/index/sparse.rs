//! Linear scan of the sparse region, and the Bloom filter built from it

use std::fs::File;

use crate::bloom::BloomFilter;
use crate::config::Config;
use crate::error::Result;
use crate::storage::{peek_id, peek_kind, DataRecord, Header, IndexRecord, LineScanner, Record, RecordKind};

use super::{IndexEngine, Region, Resolution};

/// A record and the offset it was read from
type Located<T> = Option<(u64, T)>;

impl IndexEngine<'_> {
    /// Scan `[bnd, EOF)` for `id`, keeping the last Index and last Data seen
    pub(crate) fn scan_sparse(&self, id: &str, label: &str) -> Result<Option<Resolution>> {
        let (last_index, last_data) = self.last_sparse_records(id, label)?;

        let index_offset = last_index.as_ref().map(|(offset, _)| *offset);
        match (last_index, last_data) {
            (_, Some((data_offset, data))) => Ok(Some(Resolution {
                region: Region::Sparse,
                index_offset,
                data_offset,
                data,
            })),
            (Some((_, index)), None) => {
                let data = self.read_data(index.offset, id)?;
                Ok(Some(Resolution {
                    region: Region::Sparse,
                    index_offset,
                    data_offset: index.offset,
                    data,
                }))
            }
            (None, None) => Ok(None),
        }
    }

    /// Sparse Data record for `label` written after `pointer`, if any
    pub(crate) fn newer_sparse_data(
        &self,
        id: &str,
        label: &str,
        pointer: u64,
    ) -> Result<Option<(u64, DataRecord)>> {
        if !self.sparse_may_contain(id) {
            return Ok(None);
        }

        match self.last_sparse_records(id, label)? {
            (_, Some((data_offset, data))) if data_offset > pointer => {
                tracing::warn!(id, pointer, data_offset, "data record newer than its index pointer");
                Ok(Some((data_offset, data)))
            }
            _ => Ok(None),
        }
    }

    fn last_sparse_records(&self, id: &str, label: &str) -> Result<(Located<IndexRecord>, Located<DataRecord>)> {
        let mut last_index: Located<IndexRecord> = None;
        let mut last_data: Located<DataRecord> = None;

        let scanner = LineScanner::new(
            self.file,
            self.header.boundary,
            self.file_len,
            self.read_buffer_size,
            self.max_record_size,
        )?;

        for line in scanner {
            let line = line?;
            if peek_id(&line.bytes) != Some(id.as_bytes()) {
                continue;
            }
            if !line.terminated {
                tracing::warn!(offset = line.offset, "ignoring torn record at end of file");
                break;
            }

            match Record::decode(&line.bytes, line.offset)? {
                Record::Index(record) if record.label == label => {
                    last_index = Some((line.offset, record));
                }
                Record::Data(record) if record.label == label => {
                    last_data = Some((line.offset, record));
                }
                _ => {}
            }
        }

        Ok((last_index, last_data))
    }
}

/// Build a Bloom filter over the ids of Index/Data records in `[bnd, EOF)`
pub fn build_bloom(file: &File, header: &Header, file_len: u64, config: &Config) -> Result<BloomFilter> {
    let scanner = LineScanner::new(
        file,
        header.boundary,
        file_len,
        config.read_buffer_size,
        config.max_record_size,
    )?;

    let mut ids: Vec<Vec<u8>> = Vec::new();
    for line in scanner {
        let line = line?;
        if matches!(peek_kind(&line.bytes), Some(RecordKind::Index | RecordKind::Data)) {
            if let Some(id) = peek_id(&line.bytes) {
                ids.push(id.to_vec());
            }
        }
    }

    let capacity = (ids.len() * 2).max(config.bloom_capacity);
    let mut bloom = BloomFilter::new(capacity, config.bloom_false_positive_rate);
    for id in &ids {
        bloom.insert(id);
    }

    tracing::debug!(ids = ids.len(), capacity, bits = bloom.num_bits(), "built sparse-region bloom filter");
    Ok(bloom)
}
