//! Error types for flatdoc
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

use crate::codec::HashAlgorithm;

/// Result type alias using FlatDocError
pub type Result<T> = std::result::Result<T, FlatDocError>;

/// Unified error type for flatdoc operations
#[derive(Debug, Error)]
pub enum FlatDocError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // -------------------------------------------------------------------------
    // Lookup Errors
    // -------------------------------------------------------------------------
    /// Label absent, or present only as a soft-deleted document
    #[error("Document not found: {0}")]
    NotFound(String),

    // -------------------------------------------------------------------------
    // File Integrity Errors
    // -------------------------------------------------------------------------
    /// A line failed to decode, the header is malformed, or a record is
    /// larger than the configured maximum
    #[error("Corrupt record at offset {offset}: {reason}")]
    Corrupt { offset: u64, reason: String },

    #[error("Hash algorithm mismatch: file uses {file}, handle configured for {configured}")]
    AlgorithmMismatch {
        file: HashAlgorithm,
        configured: HashAlgorithm,
    },

    // -------------------------------------------------------------------------
    // Concurrency Errors
    // -------------------------------------------------------------------------
    #[error("Lock contention: {0}")]
    LockContention(String),

    // -------------------------------------------------------------------------
    // Caller Errors
    // -------------------------------------------------------------------------
    #[error("Record too large: {size} bytes (max {limit})")]
    RecordTooLarge { size: usize, limit: usize },

    #[error("Invalid label: {0}")]
    InvalidLabel(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl FlatDocError {
    /// Shorthand for a [`FlatDocError::Corrupt`] at `offset`
    pub fn corrupt(offset: u64, reason: impl Into<String>) -> Self {
        FlatDocError::Corrupt {
            offset,
            reason: reason.into(),
        }
    }

    /// True for `NotFound`; handy for callers that treat absence as a value
    pub fn is_not_found(&self) -> bool {
        matches!(self, FlatDocError::NotFound(_))
    }
}
