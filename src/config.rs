//! Configuration for flatdoc
//!
//! Centralized configuration with sensible defaults. Values are consumed as
//! plain parameters; there is no config file format.

use crate::codec::{Compression, HashAlgorithm};

/// Main configuration for an [`Engine`](crate::Engine) handle
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Format Configuration
    // -------------------------------------------------------------------------
    /// Algorithm used to derive ids from labels. Must match the header of an
    /// existing file, otherwise document operations fail with
    /// `AlgorithmMismatch` until `rehash` is run.
    pub hash_algorithm: HashAlgorithm,

    /// Snapshot compression for a newly created file. Existing files keep
    /// the compression recorded in their header.
    pub compression: Compression,

    /// History retention for a newly created file
    pub keep_history: bool,

    // -------------------------------------------------------------------------
    // I/O Configuration
    // -------------------------------------------------------------------------
    /// Buffer size for sequential scans (in bytes)
    pub read_buffer_size: usize,

    /// Largest line accepted on read or write (in bytes)
    pub max_record_size: usize,

    /// fsync after every append and header patch
    pub sync_writes: bool,

    /// How to behave when another process holds the file lock
    pub lock_mode: LockMode,

    // -------------------------------------------------------------------------
    // Bloom Filter Configuration
    // -------------------------------------------------------------------------
    /// Build a Bloom filter over sparse-region ids at open
    pub bloom_filter: bool,

    /// Target false positive rate of the filter
    pub bloom_false_positive_rate: f64,

    /// Minimum number of keys the filter is sized for
    pub bloom_capacity: usize,
}

/// Lock acquisition strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Wait until the lock is free
    Blocking,

    /// Fail with `LockContention` if the lock is held elsewhere
    NonBlocking,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hash_algorithm: HashAlgorithm::Xxh3,
            compression: Compression::Zstd,
            keep_history: true,
            read_buffer_size: 64 * 1024,          // 64 KB
            max_record_size: 16 * 1024 * 1024,    // 16 MB
            sync_writes: true,
            lock_mode: LockMode::Blocking,
            bloom_filter: true,
            bloom_false_positive_rate: 0.01,
            bloom_capacity: 4096,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the label hash algorithm
    pub fn hash_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.config.hash_algorithm = algorithm;
        self
    }

    /// Set the snapshot compression used when creating a file
    pub fn compression(mut self, compression: Compression) -> Self {
        self.config.compression = compression;
        self
    }

    /// Enable or disable history retention when creating a file
    pub fn keep_history(mut self, keep: bool) -> Self {
        self.config.keep_history = keep;
        self
    }

    /// Set the sequential read buffer size (in bytes)
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size;
        self
    }

    /// Set the maximum record size (in bytes)
    pub fn max_record_size(mut self, size: usize) -> Self {
        self.config.max_record_size = size;
        self
    }

    /// Toggle fsync after every write
    pub fn sync_writes(mut self, sync: bool) -> Self {
        self.config.sync_writes = sync;
        self
    }

    /// Set the lock acquisition strategy
    pub fn lock_mode(mut self, mode: LockMode) -> Self {
        self.config.lock_mode = mode;
        self
    }

    /// Enable or disable the sparse-region Bloom filter
    pub fn bloom_filter(mut self, enabled: bool) -> Self {
        self.config.bloom_filter = enabled;
        self
    }

    /// Set the Bloom filter false positive rate
    pub fn bloom_false_positive_rate(mut self, rate: f64) -> Self {
        self.config.bloom_false_positive_rate = rate;
        self
    }

    /// Set the minimum Bloom filter capacity (in keys)
    pub fn bloom_capacity(mut self, capacity: usize) -> Self {
        self.config.bloom_capacity = capacity;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
