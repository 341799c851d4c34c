//! Engine Module
//!
//! The open handle that coordinates every component for one file.
//!
//! ## Responsibilities
//! - Create the file (header only) on first open
//! - Take the cross-process lock for each operation (shared for reads,
//!   exclusive for writes and maintenance)
//! - Notice when another process replaced or extended the file
//! - Route document operations to the Index Engine / Write Protocol and
//!   maintenance operations to the Compactor / Repair scan

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use same_file::Handle;

use crate::bloom::BloomFilter;
use crate::codec::{Compressor, HashAlgorithm, IdHasher};
use crate::compaction::{
    load_records, publish, scan_valid_prefix, CompactionStats, Compactor, Reconciler,
    RepairReport, ValidPrefix,
};
use crate::config::Config;
use crate::error::{FlatDocError, Result};
use crate::index::{build_bloom, IndexEngine, Resolution, Revision};
use crate::lock::{FileLock, LockKind};
use crate::search::Matcher;
use crate::storage::{file_len, has_clean_tail, Header, HEADER_LEN};
use crate::writer::{validate_label, WriteOutcome, WriteProtocol};

/// A live document returned by `search`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub label: String,
    pub content: String,
}

/// Layout and cache state of the open file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineStats {
    pub file_len: u64,
    /// Bytes in the sorted Index block
    pub sorted_index_bytes: u64,
    /// Bytes in the compacted Data and History blocks
    pub compacted_bytes: u64,
    /// Bytes appended since the last compaction
    pub sparse_bytes: u64,
    pub dirty: bool,
    /// Ids in the Bloom filter; `None` when no filter is active
    pub bloom_entries: Option<usize>,
}

/// Handle on one document file
///
/// ## Concurrency Model
///
/// - **Across processes**: advisory lock on `<file>.lock`, shared for
///   reads and exclusive for everything that writes. Taken per operation.
/// - **Within a process**: all calls on one handle serialize on `inner`.
///
/// Nothing outlives the handle: dropping (or `close`) releases the file,
/// the lock file and the Bloom filter.
pub struct Engine {
    /// Path of the document file
    path: PathBuf,

    /// Handle configuration
    config: Config,

    /// Mutable per-handle state
    inner: Mutex<Inner>,
}

struct Inner {
    /// Open data file (read + write)
    file: File,

    /// Identity of `file`, compared against the path to detect a swap
    identity: Handle,

    /// Sidecar lock
    file_lock: FileLock,

    /// Id function document operations use
    hasher: Box<dyn IdHasher>,

    /// Filter over sparse-region ids, if enabled and still trustworthy
    bloom: Option<BloomFilter>,

    /// File length after this handle's last operation
    observed_len: u64,
}

impl Engine {
    /// Open `path`, creating it (header only) if it does not exist
    ///
    /// Fails with `Corrupt` if the header is unreadable; use
    /// [`Engine::repair_file`] in that case. A torn final record is only
    /// reported: reads skip it and writes refuse to run until `repair`.
    pub fn open(path: impl AsRef<Path>, config: Config) -> Result<Self> {
        validate_config(&config)?;

        let path = path.as_ref().to_path_buf();
        let file_lock = FileLock::open(&path, config.lock_mode)?;
        let file = open_data_file(&path)?;

        let (header, len) = {
            let guard = file_lock.shared()?;
            if file_len(&file)? == 0 {
                drop(guard);
                let _guard = file_lock.exclusive()?;
                initialize(&file, &config)?
            } else {
                (Header::read(&file)?, file_len(&file)?)
            }
        };

        if !has_clean_tail(&file, len)? {
            tracing::warn!(path = %path.display(), len, "file ends with a torn record; run repair before writing");
        }
        if header.algorithm != config.hash_algorithm {
            tracing::warn!(
                file = %header.algorithm,
                configured = %config.hash_algorithm,
                "hash algorithm mismatch; document operations will fail until rehash"
            );
        }

        let bloom = if config.bloom_filter {
            Some(build_bloom(&file, &header, len, &config)?)
        } else {
            None
        };

        tracing::debug!(
            path = %path.display(),
            len,
            algorithm = %header.algorithm,
            dirty = header.dirty,
            "opened"
        );

        let inner = Inner {
            identity: Handle::from_file(file.try_clone()?)?,
            file,
            file_lock,
            hasher: config.hash_algorithm.hasher(),
            bloom,
            observed_len: len,
        };

        Ok(Self {
            path,
            config,
            inner: Mutex::new(inner),
        })
    }

    // =========================================================================
    // Document Operations
    // =========================================================================

    /// Current content of `label`
    ///
    /// `NotFound` if the label was never written or is soft-deleted.
    pub fn get(&self, label: &str) -> Result<String> {
        validate_label(label)?;
        self.with_documents(LockKind::Shared, |inner, header, len| {
            let id = inner.hasher.id(label);
            inner
                .reader(&header, len, &self.config)
                .lookup(&id, label)?
                .ok_or_else(|| FlatDocError::NotFound(label.to_string()))
        })
    }

    /// Write a new version of `label`
    ///
    /// Empty content is a delete and follows [`Engine::delete`].
    pub fn set(&self, label: &str, content: &str) -> Result<()> {
        if content.is_empty() {
            return self.delete(label);
        }
        validate_label(label)?;
        self.with_documents(LockKind::Exclusive, |inner, mut header, _| {
            let compressor = header.compression.compressor();
            let outcome = inner
                .writer(&mut header, compressor.as_ref(), &self.config)
                .set(label, content)?;
            inner.record_write(&outcome);
            Ok(())
        })
    }

    /// Soft-delete `label`, keeping its history
    ///
    /// `NotFound` if there is no live version to delete.
    pub fn delete(&self, label: &str) -> Result<()> {
        validate_label(label)?;
        self.with_documents(LockKind::Exclusive, |inner, mut header, _| {
            let compressor = header.compression.compressor();
            let outcome = inner
                .writer(&mut header, compressor.as_ref(), &self.config)
                .delete(label)?;
            inner.record_write(&outcome);
            Ok(())
        })
    }

    pub fn exists(&self, label: &str) -> Result<bool> {
        match self.get(label) {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Labels of all live documents, sorted
    pub fn list(&self) -> Result<Vec<String>> {
        self.with_documents(LockKind::Shared, |inner, header, len| {
            let documents = inner.reader(&header, len, &self.config).current_documents()?;
            Ok(documents
                .into_values()
                .filter(|d| !d.is_deleted())
                .map(|d| d.label)
                .collect())
        })
    }

    /// Live documents whose content matches `pattern`, sorted by label
    pub fn search(&self, pattern: &str) -> Result<Vec<Document>> {
        let matcher = Matcher::new(pattern)?;
        self.with_documents(LockKind::Shared, |inner, header, len| {
            let documents = inner.reader(&header, len, &self.config).current_documents()?;
            Ok(documents
                .into_values()
                .filter(|d| !d.is_deleted() && matcher.is_match(&d.content))
                .map(|d| Document {
                    label: d.label,
                    content: d.content,
                })
                .collect())
        })
    }

    /// Labels of live documents that match `pattern`, sorted
    pub fn match_label(&self, pattern: &str) -> Result<Vec<String>> {
        let matcher = Matcher::new(pattern)?;
        Ok(self
            .list()?
            .into_iter()
            .filter(|label| matcher.is_match(label))
            .collect())
    }

    /// Superseded versions of `label`, oldest first
    ///
    /// Works for soft-deleted documents too. `NotFound` only if the label
    /// has never been written.
    pub fn history(&self, label: &str) -> Result<Vec<Revision>> {
        validate_label(label)?;
        self.with_documents(LockKind::Shared, |inner, header, len| {
            let id = inner.hasher.id(label);
            let compressor = header.compression.compressor();
            inner
                .reader(&header, len, &self.config)
                .history(&id, label, compressor.as_ref())?
                .ok_or_else(|| FlatDocError::NotFound(label.to_string()))
        })
    }

    /// Where `label` currently resolves (region and offsets), deleted or not
    pub fn resolve(&self, label: &str) -> Result<Option<Resolution>> {
        validate_label(label)?;
        self.with_documents(LockKind::Shared, |inner, header, len| {
            let id = inner.hasher.id(label);
            inner.reader(&header, len, &self.config).resolve(&id, label)
        })
    }

    // =========================================================================
    // Maintenance Operations
    // =========================================================================

    /// Rewrite into canonical sorted form, keeping history
    pub fn compact(&self) -> Result<CompactionStats> {
        self.rewrite(None, true)
    }

    /// Rewrite into canonical sorted form, dropping history and
    /// soft-deleted documents
    pub fn purge(&self) -> Result<CompactionStats> {
        self.rewrite(None, false)
    }

    /// Recompute every id with `algorithm` and rewrite the file
    ///
    /// The handle switches to `algorithm` for subsequent operations.
    pub fn rehash(&self, algorithm: HashAlgorithm) -> Result<CompactionStats> {
        self.rewrite(Some(algorithm), true)
    }

    /// Cut the file at the first record that does not decode and rebuild
    /// it from what came before
    pub fn repair(&self) -> Result<(RepairReport, CompactionStats)> {
        self.with_file(LockKind::Exclusive, |inner, _| {
            let outcome = repair_locked(&inner.file, &self.path, &self.config)?;
            inner.reload(&self.path, &self.config)?;
            if let Ok(header) = Header::read(&inner.file) {
                if header.algorithm != inner.hasher.algorithm() {
                    tracing::warn!(
                        file = %header.algorithm,
                        configured = %inner.hasher.algorithm(),
                        "repaired file uses a different hash algorithm"
                    );
                }
            }
            Ok(outcome)
        })
    }

    /// Run the repair scan without changing the file
    pub fn verify(&self) -> Result<RepairReport> {
        self.with_file(LockKind::Shared, |inner, len| {
            Ok(scan_valid_prefix(&inner.file, len, &self.config)?.report)
        })
    }

    /// Repair a file that cannot be opened (e.g. its header is damaged)
    ///
    /// A header that does not decode is rebuilt from `config`.
    pub fn repair_file(path: impl AsRef<Path>, config: &Config) -> Result<(RepairReport, CompactionStats)> {
        let path = path.as_ref();
        let file_lock = FileLock::open(path, config.lock_mode)?;
        let _guard = file_lock.exclusive()?;
        let file = File::open(path)?;
        repair_locked(&file, path, config)
    }

    /// [`Engine::verify`] without opening a handle
    pub fn verify_file(path: impl AsRef<Path>, config: &Config) -> Result<RepairReport> {
        let path = path.as_ref();
        let file_lock = FileLock::open(path, config.lock_mode)?;
        let _guard = file_lock.shared()?;
        let file = File::open(path)?;
        let len = file_len(&file)?;
        Ok(scan_valid_prefix(&file, len, config)?.report)
    }

    // =========================================================================
    // Lifecycle & Accessors
    // =========================================================================

    /// Close the handle, flushing the file to disk
    pub fn close(self) -> Result<()> {
        let inner = self.inner.into_inner();
        inner.file.sync_all()?;
        tracing::debug!(path = %self.path.display(), "closed");
        Ok(())
    }

    /// Current header of the file
    pub fn header(&self) -> Result<Header> {
        self.with_file(LockKind::Shared, |inner, _| Header::read(&inner.file))
    }

    pub fn stats(&self) -> Result<EngineStats> {
        self.with_file(LockKind::Shared, |inner, len| {
            let header = Header::read(&inner.file)?;
            Ok(EngineStats {
                file_len: len,
                sorted_index_bytes: header.index_end - HEADER_LEN,
                compacted_bytes: header.boundary - header.index_end,
                sparse_bytes: len.saturating_sub(header.boundary),
                dirty: header.dirty,
                bloom_entries: inner.bloom.as_ref().map(BloomFilter::len),
            })
        })
    }

    /// Path of the document file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Algorithm document operations currently derive ids with
    pub fn hash_algorithm(&self) -> HashAlgorithm {
        self.inner.lock().hasher.algorithm()
    }

    // =========================================================================
    // Internal Helpers
    // =========================================================================

    /// Run `op` under the handle mutex and the file lock, after refreshing
    fn with_file<T, F>(&self, kind: LockKind, op: F) -> Result<T>
    where
        F: FnOnce(&mut Inner, u64) -> Result<T>,
    {
        let mut inner = self.inner.lock();
        let _guard = match kind {
            LockKind::Shared => inner.file_lock.shared()?,
            LockKind::Exclusive => inner.file_lock.exclusive()?,
        };
        let len = inner.refresh(&self.path, &self.config)?;
        op(&mut *inner, len)
    }

    /// [`Engine::with_file`] plus a header whose algorithm matches the handle
    fn with_documents<T, F>(&self, kind: LockKind, op: F) -> Result<T>
    where
        F: FnOnce(&mut Inner, Header, u64) -> Result<T>,
    {
        self.with_file(kind, |inner, len| {
            let header = Header::read(&inner.file)?;
            let configured = inner.hasher.algorithm();
            if header.algorithm != configured {
                return Err(FlatDocError::AlgorithmMismatch {
                    file: header.algorithm,
                    configured,
                });
            }
            op(inner, header, len)
        })
    }

    /// Compact, purge or rehash
    fn rewrite(&self, algorithm: Option<HashAlgorithm>, keep_history: bool) -> Result<CompactionStats> {
        self.with_file(LockKind::Exclusive, |inner, len| {
            let header = Header::read(&inner.file)?;
            let target = algorithm.unwrap_or(header.algorithm);
            let hasher = target.hasher();

            let reconciler = load_records(&inner.file, len, &self.config)?;
            let records = reconciler.record_count();
            let compactor = Compactor::new(hasher.as_ref(), keep_history, self.config.max_record_size);
            let (_, mut stats) =
                publish(&self.path, |out| compactor.write(reconciler.finish(), &header, out))?;
            stats.bytes_before = len;

            inner.reload(&self.path, &self.config)?;
            if algorithm.is_some() {
                inner.hasher = hasher;
            }

            tracing::info!(
                path = %self.path.display(),
                algorithm = %target,
                keep_history,
                records,
                documents = stats.documents,
                bytes_before = stats.bytes_before,
                bytes_after = stats.bytes_after,
                "rewrite published"
            );
            Ok(stats)
        })
    }
}

impl Inner {
    /// Pick up changes made by other handles; returns the current length
    fn refresh(&mut self, path: &Path, config: &Config) -> Result<u64> {
        let current = Handle::from_path(path)?;
        if current != self.identity {
            tracing::info!(path = %path.display(), "file replaced by another handle, reopening");
            self.file = open_data_file(path)?;
            self.identity = Handle::from_file(self.file.try_clone()?)?;
            let len = file_len(&self.file)?;
            self.bloom = if config.bloom_filter {
                match Header::read(&self.file) {
                    Ok(header) => Some(build_bloom(&self.file, &header, len, config)?),
                    Err(e) => {
                        tracing::warn!(error = %e, "cannot rebuild bloom filter");
                        None
                    }
                }
            } else {
                None
            };
            self.observed_len = len;
            return Ok(len);
        }

        let len = file_len(&self.file)?;
        if len != self.observed_len {
            if self.bloom.take().is_some() {
                tracing::warn!(
                    expected = self.observed_len,
                    actual = len,
                    "file changed outside this handle; dropping bloom filter"
                );
            }
            self.observed_len = len;
        }
        Ok(len)
    }

    /// Reopen after this handle published a rewrite
    fn reload(&mut self, path: &Path, config: &Config) -> Result<()> {
        self.file = open_data_file(path)?;
        self.identity = Handle::from_file(self.file.try_clone()?)?;
        self.observed_len = file_len(&self.file)?;
        // Sparse region is empty after a rewrite
        self.bloom = config
            .bloom_filter
            .then(|| BloomFilter::new(config.bloom_capacity, config.bloom_false_positive_rate));
        Ok(())
    }

    fn reader<'a>(&'a self, header: &'a Header, len: u64, config: &Config) -> IndexEngine<'a> {
        IndexEngine::new(&self.file, header, len, config.read_buffer_size, config.max_record_size)
            .with_bloom(self.bloom.as_ref())
    }

    fn writer<'a>(
        &'a self,
        header: &'a mut Header,
        compressor: &'a dyn Compressor,
        config: &'a Config,
    ) -> WriteProtocol<'a> {
        WriteProtocol {
            file: &self.file,
            header,
            hasher: self.hasher.as_ref(),
            compressor,
            config,
            bloom: self.bloom.as_ref(),
        }
    }

    fn record_write(&mut self, outcome: &WriteOutcome) {
        self.observed_len = outcome.file_len;
        if let Some(bloom) = self.bloom.as_mut() {
            bloom.insert(outcome.id.as_bytes());
        }
    }
}

/// Repair scan + reconciliation + publish; caller holds the exclusive lock
fn repair_locked(file: &File, path: &Path, config: &Config) -> Result<(RepairReport, CompactionStats)> {
    let len = file_len(file)?;
    let ValidPrefix {
        header,
        records,
        report,
    } = scan_valid_prefix(file, len, config)?;

    let mut reconciler = Reconciler::new();
    for record in records {
        reconciler.absorb(record);
    }

    let hasher = header.algorithm.hasher();
    let compactor = Compactor::new(hasher.as_ref(), true, config.max_record_size);
    let (_, mut stats) = publish(path, |out| compactor.write(reconciler.finish(), &header, out))?;
    stats.bytes_before = len;

    tracing::info!(
        path = %path.display(),
        recovered = report.records_recovered,
        discarded = report.bytes_discarded,
        header_rebuilt = report.header_rebuilt,
        "repair published"
    );
    Ok((report, stats))
}

/// Write the header of a brand new file; caller holds the exclusive lock
fn initialize(file: &File, config: &Config) -> Result<(Header, u64)> {
    // Another handle may have won the race
    let len = file_len(file)?;
    if len > 0 {
        return Ok((Header::read(file)?, len));
    }

    let header = Header::new(config.hash_algorithm, config.compression, config.keep_history);
    header.write(file, config.sync_writes)?;
    tracing::info!(
        algorithm = %header.algorithm,
        compression = %header.compression,
        "created new document file"
    );
    Ok((header, HEADER_LEN))
}

fn open_data_file(path: &Path) -> Result<File> {
    Ok(OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?)
}

fn validate_config(config: &Config) -> Result<()> {
    let rate = config.bloom_false_positive_rate;
    if !(rate > 0.0 && rate < 1.0) {
        return Err(FlatDocError::Config(format!(
            "bloom_false_positive_rate must be in (0, 1), got {}",
            rate
        )));
    }
    if config.read_buffer_size == 0 {
        return Err(FlatDocError::Config("read_buffer_size must be positive".to_string()));
    }
    if config.max_record_size == 0 {
        return Err(FlatDocError::Config("max_record_size must be positive".to_string()));
    }
    Ok(())
}
