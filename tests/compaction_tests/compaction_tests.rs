//! Tests for Compact, Purge and Rehash
//!
//! These tests verify:
//! - Rewrites never change get/list results
//! - Compact keeps history, Purge drops it (and soft-deleted documents)
//! - Output is canonical: sorted Index block, empty sparse region
//! - Rehash recomputes every id and clears AlgorithmMismatch

use std::io::Write;
use std::path::{Path, PathBuf};

use flatdoc::codec::IdHasher;
use flatdoc::storage::{Record, HEADER_LEN};
use flatdoc::{Config, Engine, FlatDocError, HashAlgorithm};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn fast_config() -> Config {
    Config::builder().sync_writes(false).build()
}

fn setup() -> (TempDir, PathBuf, Engine) {
    init_tracing();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("compact.fdb");
    let engine = Engine::open(&path, fast_config()).unwrap();
    (temp_dir, path, engine)
}

fn populate(engine: &Engine) {
    for i in 0..30 {
        engine.set(&format!("doc{}", i), &format!("v1-{}", i)).unwrap();
    }
    for i in (0..30).step_by(2) {
        engine.set(&format!("doc{}", i), &format!("v2-{}", i)).unwrap();
    }
    for i in (0..30).step_by(5) {
        engine.delete(&format!("doc{}", i)).unwrap();
    }
}

/// (label, content) of every live document
fn snapshot(engine: &Engine) -> Vec<(String, String)> {
    engine
        .list()
        .unwrap()
        .into_iter()
        .map(|label| {
            let content = engine.get(&label).unwrap();
            (label, content)
        })
        .collect()
}

fn file_records(path: &Path) -> Vec<Record> {
    let bytes = std::fs::read(path).unwrap();
    bytes[HEADER_LEN as usize..]
        .split(|&b| b == b'\n')
        .filter(|line| !line.is_empty())
        .map(|line| Record::decode(line, 0).unwrap())
        .collect()
}

// =============================================================================
// Compact Tests
// =============================================================================

#[test]
fn test_compact_preserves_get_and_list() {
    let (_temp, _path, engine) = setup();
    populate(&engine);
    let before = snapshot(&engine);

    let stats = engine.compact().unwrap();

    assert_eq!(snapshot(&engine), before);
    assert_eq!(stats.documents, 30);
    assert_eq!(stats.live_documents, before.len());
}

#[test]
fn test_compact_preserves_history() {
    let (_temp, _path, engine) = setup();
    populate(&engine);
    let before = engine.history("doc0").unwrap();

    engine.compact().unwrap();

    assert_eq!(engine.history("doc0").unwrap(), before);
    let contents: Vec<String> = before.into_iter().map(|r| r.content).collect();
    assert_eq!(contents, vec!["v1-0", "v2-0"]);
}

#[test]
fn test_compact_output_is_canonical() {
    let (_temp, path, engine) = setup();
    populate(&engine);

    let stats = engine.compact().unwrap();
    let header = engine.header().unwrap();
    let file_len = std::fs::metadata(&path).unwrap().len();

    assert!(!header.dirty);
    assert_eq!(header.boundary, file_len);
    assert_eq!(stats.bytes_after, file_len);
    assert!(stats.bytes_before > stats.bytes_after);
    assert_eq!(engine.stats().unwrap().sparse_bytes, 0);

    let records = file_records(&path);
    let index_ids: Vec<&str> = records
        .iter()
        .take_while(|r| matches!(r, Record::Index(_)))
        .map(|r| r.id())
        .collect();
    assert_eq!(index_ids.len(), 30);
    assert!(index_ids.windows(2).all(|w| w[0] < w[1]));
    // Index block, then Data block, then History block
    assert!(records[30..60].iter().all(|r| matches!(r, Record::Data(_))));
    assert!(records[60..].iter().all(|r| matches!(r, Record::History(_))));
}

#[test]
fn test_compact_is_idempotent() {
    let (_temp, path, engine) = setup();
    populate(&engine);

    engine.compact().unwrap();
    let first = std::fs::read(&path).unwrap();
    engine.compact().unwrap();
    let second = std::fs::read(&path).unwrap();

    assert_eq!(first, second);
}

#[test]
fn test_writes_after_compact() {
    let (_temp, _path, engine) = setup();
    populate(&engine);
    engine.compact().unwrap();

    engine.set("doc1", "after").unwrap();
    engine.set("brand-new", "x").unwrap();
    engine.delete("doc3").unwrap();

    assert_eq!(engine.get("doc1").unwrap(), "after");
    assert_eq!(engine.get("brand-new").unwrap(), "x");
    assert!(engine.get("doc3").unwrap_err().is_not_found());

    let before = snapshot(&engine);
    engine.compact().unwrap();
    assert_eq!(snapshot(&engine), before);
}

#[test]
fn test_compact_empty_file() {
    let (_temp, _path, engine) = setup();

    let stats = engine.compact().unwrap();

    assert_eq!(stats.documents, 0);
    assert_eq!(stats.bytes_after, HEADER_LEN);
    assert!(engine.list().unwrap().is_empty());
}

#[test]
fn test_compact_refuses_torn_tail() {
    let (_temp, path, engine) = setup();
    engine.set("a", "1").unwrap();
    let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(b"{\"t\":\"d\"").unwrap();
    drop(file);

    assert!(matches!(engine.compact(), Err(FlatDocError::Corrupt { .. })));
    assert_eq!(engine.get("a").unwrap(), "1");
}

// =============================================================================
// Purge Tests
// =============================================================================

#[test]
fn test_purge_preserves_get_and_list() {
    let (_temp, _path, engine) = setup();
    populate(&engine);
    let before = snapshot(&engine);

    let stats = engine.purge().unwrap();

    assert_eq!(snapshot(&engine), before);
    assert_eq!(stats.history_records, 0);
    assert_eq!(stats.documents, before.len());
}

#[test]
fn test_purge_empties_history() {
    let (_temp, path, engine) = setup();
    populate(&engine);

    engine.purge().unwrap();

    assert!(engine.history("doc2").unwrap().is_empty());
    // Soft-deleted documents are gone entirely
    assert!(engine.history("doc0").unwrap_err().is_not_found());
    assert!(file_records(&path).iter().all(|r| !matches!(r, Record::History(_))));
}

// =============================================================================
// Rehash Tests
// =============================================================================

#[test]
fn test_rehash_keeps_documents_and_recomputes_ids() {
    let (_temp, path, engine) = setup();
    populate(&engine);
    let before = snapshot(&engine);
    let history_before = engine.history("doc4").unwrap();

    engine.rehash(HashAlgorithm::Sha256).unwrap();

    assert_eq!(engine.hash_algorithm(), HashAlgorithm::Sha256);
    assert_eq!(engine.header().unwrap().algorithm, HashAlgorithm::Sha256);
    assert_eq!(snapshot(&engine), before);
    assert_eq!(engine.history("doc4").unwrap(), history_before);

    let hasher = HashAlgorithm::Sha256.hasher();
    for record in file_records(&path) {
        assert_eq!(record.id(), hasher.id(record.label()));
    }
}

#[test]
fn test_rehash_round_trip() {
    let (_temp, path, engine) = setup();
    populate(&engine);
    engine.compact().unwrap();
    let canonical = std::fs::read(&path).unwrap();

    engine.rehash(HashAlgorithm::Xxh64).unwrap();
    engine.rehash(HashAlgorithm::Xxh3).unwrap();

    assert_eq!(std::fs::read(&path).unwrap(), canonical);
}

#[test]
fn test_algorithm_mismatch_until_rehash() {
    init_tracing();
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("mismatch.fdb");

    {
        let engine = Engine::open(&path, fast_config()).unwrap();
        engine.set("a", "1").unwrap();
        engine.close().unwrap();
    }

    let config = Config::builder().hash_algorithm(HashAlgorithm::Sha256).build();
    let engine = Engine::open(&path, config).unwrap();

    match engine.get("a") {
        Err(FlatDocError::AlgorithmMismatch { file, configured }) => {
            assert_eq!(file, HashAlgorithm::Xxh3);
            assert_eq!(configured, HashAlgorithm::Sha256);
        }
        other => panic!("expected mismatch, got {:?}", other),
    }
    assert!(matches!(engine.set("b", "2"), Err(FlatDocError::AlgorithmMismatch { .. })));

    // Maintenance runs with the file's own algorithm
    engine.compact().unwrap();
    assert!(matches!(engine.list(), Err(FlatDocError::AlgorithmMismatch { .. })));

    engine.rehash(HashAlgorithm::Sha256).unwrap();
    assert_eq!(engine.get("a").unwrap(), "1");
}
