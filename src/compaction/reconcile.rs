//! Id reconciliation shared by compaction, rehash and repair
//!
//! Records are fed in file order. Per label, the highest-offset Data record
//! is the current version, and History records are kept in timestamp order
//! (write order on ties). Index records are derived data and are ignored:
//! the output gets a fresh Index block.

use std::collections::BTreeMap;

use crate::storage::{DataRecord, HistoryRecord, Record};

/// Everything the file says about one label
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentState {
    pub label: String,
    /// Latest Data record, if any survived
    pub data: Option<DataRecord>,
    /// Superseded versions, oldest first
    pub history: Vec<HistoryRecord>,
}

impl DocumentState {
    /// Has a current version with content
    pub fn is_live(&self) -> bool {
        self.data.as_ref().is_some_and(|d| !d.is_deleted())
    }
}

/// Folds a stream of records into per-label state
#[derive(Debug, Default)]
pub struct Reconciler {
    documents: BTreeMap<String, DocumentState>,
    records: u64,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the next record (must be called in file order)
    pub fn absorb(&mut self, record: Record) {
        self.records += 1;
        match record {
            Record::Index(_) => {}
            Record::Data(data) => {
                let label = data.label.clone();
                self.entry(&label).data = Some(data);
            }
            Record::History(history) => {
                self.entry(&history.label).history.push(history);
            }
        }
    }

    /// Number of records absorbed
    pub fn record_count(&self) -> u64 {
        self.records
    }

    /// Per-label state, sorted by label
    pub fn finish(self) -> Vec<DocumentState> {
        self.documents
            .into_values()
            .map(|mut doc| {
                doc.history.sort_by_key(|h| h.ts);
                doc
            })
            .collect()
    }

    fn entry(&mut self, label: &str) -> &mut DocumentState {
        self.documents
            .entry(label.to_string())
            .or_insert_with(|| DocumentState {
                label: label.to_string(),
                ..Default::default()
            })
    }
}
