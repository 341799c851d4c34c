//! Tests for Repair and Verify
//!
//! These tests verify:
//! - A record truncated mid-write is dropped, everything before it kept
//! - A malformed line cuts off everything after it
//! - Torn tails block writes until repair
//! - Records over the size limit read back as corrupt
//! - Damaged headers are rebuilt by `repair_file`

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use flatdoc::storage::HEADER_LEN;
use flatdoc::{Config, Engine, FlatDocError};
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

fn setup() -> (TempDir, PathBuf, Engine) {
    init_tracing();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("repair.fdb");
    let engine = Engine::open(&path, Config::default()).unwrap();
    (temp_dir, path, engine)
}

fn file_len(path: &Path) -> u64 {
    std::fs::metadata(path).unwrap().len()
}

fn append_raw(path: &Path, bytes: &[u8]) {
    let mut file = OpenOptions::new().append(true).open(path).unwrap();
    file.write_all(bytes).unwrap();
}

// =============================================================================
// Truncation Tests
// =============================================================================

#[test]
fn test_repair_truncated_mid_record() {
    let (_temp, path, engine) = setup();
    engine.set("a", "1").unwrap();
    engine.set("b", "2").unwrap();
    engine.set("a", "3").unwrap();
    let intact = file_len(&path);

    engine.set("c", "lost in the crash").unwrap();
    let file = OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(intact + 20).unwrap();
    drop(file);

    let report = engine.verify().unwrap();
    assert_eq!(report.corrupt_offset, Some(intact));
    assert_eq!(report.bytes_discarded, 20);

    let (report, stats) = engine.repair().unwrap();
    assert_eq!(report.corrupt_offset, Some(intact));
    assert!(!report.header_rebuilt);
    assert_eq!(stats.documents, 2);

    assert_eq!(engine.get("a").unwrap(), "3");
    assert_eq!(engine.get("b").unwrap(), "2");
    assert!(engine.get("c").unwrap_err().is_not_found());
    assert_eq!(engine.history("a").unwrap()[0].content, "1");
    assert!(engine.verify().unwrap().is_clean());
}

#[test]
fn test_repair_keeps_every_complete_record() {
    let (_temp, path, engine) = setup();
    for i in 0..10 {
        engine.set(&format!("k{}", i), &i.to_string()).unwrap();
    }
    let intact = file_len(&path);
    let before = engine.verify().unwrap();
    assert!(before.is_clean());

    engine.set("k0", "half-written").unwrap();
    let file = OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(file_len(&path) - 3).unwrap();
    drop(file);

    let (report, _) = engine.repair().unwrap();
    // History + Data of the k0 update are complete; its torn line is not
    assert!(report.records_recovered >= before.records_recovered);
    assert!(report.corrupt_offset.unwrap() >= intact);

    for i in 1..10 {
        assert_eq!(engine.get(&format!("k{}", i)).unwrap(), i.to_string());
    }
    assert!(engine.get("k0").is_ok());
}

#[test]
fn test_torn_tail_blocks_writes_until_repair() {
    let (_temp, path, engine) = setup();
    engine.set("a", "1").unwrap();
    append_raw(&path, br#"{"t":"d","id":"00"#);

    assert!(matches!(engine.set("b", "2"), Err(FlatDocError::Corrupt { .. })));
    assert_eq!(engine.get("a").unwrap(), "1");

    engine.repair().unwrap();
    engine.set("b", "2").unwrap();
    assert_eq!(engine.list().unwrap(), vec!["a", "b"]);
}

#[test]
fn test_open_with_torn_tail_succeeds() {
    let (_temp, path, engine) = setup();
    engine.set("a", "1").unwrap();
    engine.close().unwrap();
    append_raw(&path, b"{\"t\":\"i\"");

    let engine = Engine::open(&path, Config::default()).unwrap();
    assert_eq!(engine.get("a").unwrap(), "1");
    assert!(!engine.verify().unwrap().is_clean());
}

// =============================================================================
// Malformed Line Tests
// =============================================================================

#[test]
fn test_repair_cuts_at_malformed_line() {
    let (_temp, path, engine) = setup();
    engine.set("before", "kept").unwrap();
    let boundary = file_len(&path);
    append_raw(&path, b"this is not a record\n");
    engine.set("after", "discarded").unwrap();

    // Reads skip lines they cannot attribute to an id
    assert_eq!(engine.get("after").unwrap(), "discarded");

    let (report, _) = engine.repair().unwrap();
    assert_eq!(report.corrupt_offset, Some(boundary));
    assert_eq!(report.records_recovered, 2);

    assert_eq!(engine.get("before").unwrap(), "kept");
    assert!(engine.get("after").unwrap_err().is_not_found());
}

#[test]
fn test_verify_clean_file() {
    let (_temp, _path, engine) = setup();
    engine.set("a", "1").unwrap();
    engine.set("a", "2").unwrap();

    let report = engine.verify().unwrap();

    assert!(report.is_clean());
    assert_eq!(report.records_recovered, 5);
    assert_eq!(report.bytes_discarded, 0);
}

#[test]
fn test_repair_clean_file_is_compaction() {
    let (_temp, _path, engine) = setup();
    engine.set("a", "1").unwrap();
    engine.set("a", "2").unwrap();

    let (report, stats) = engine.repair().unwrap();

    assert!(report.is_clean());
    assert_eq!(stats.history_records, 1);
    assert!(!engine.header().unwrap().dirty);
    assert_eq!(engine.get("a").unwrap(), "2");
}

#[test]
fn test_record_over_size_limit_is_corrupt_on_read() {
    let (_temp, path, engine) = setup();
    engine.set("small", "fits").unwrap();
    engine.set("big", &"x".repeat(1_000)).unwrap();
    engine.compact().unwrap();
    engine.close().unwrap();

    let config = Config::builder().max_record_size(256).build();
    let engine = Engine::open(&path, config).unwrap();

    assert_eq!(engine.get("small").unwrap(), "fits");
    assert!(matches!(engine.get("big"), Err(FlatDocError::Corrupt { .. })));
}

// =============================================================================
// Header Damage Tests
// =============================================================================

#[test]
fn test_repair_file_rebuilds_damaged_header() {
    let (_temp, path, engine) = setup();
    engine.set("a", "1").unwrap();
    engine.set("a", "2").unwrap();
    engine.close().unwrap();

    let mut file = OpenOptions::new().write(true).open(&path).unwrap();
    file.seek(SeekFrom::Start(0)).unwrap();
    file.write_all(b"garbage!").unwrap();
    drop(file);

    assert!(matches!(Engine::open(&path, Config::default()), Err(FlatDocError::Corrupt { offset: 0, .. })));
    assert!(Engine::verify_file(&path, &Config::default()).unwrap().header_rebuilt);

    let (report, stats) = Engine::repair_file(&path, &Config::default()).unwrap();
    assert!(report.header_rebuilt);
    assert_eq!(stats.documents, 1);

    let engine = Engine::open(&path, Config::default()).unwrap();
    assert_eq!(engine.get("a").unwrap(), "2");
    assert_eq!(engine.history("a").unwrap()[0].content, "1");
}

#[test]
fn test_repair_file_on_truncated_header() {
    init_tracing();
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("stub.fdb");
    std::fs::write(&path, b"{\"t\":\"hdr\"").unwrap();

    let (report, _) = Engine::repair_file(&path, &Config::default()).unwrap();

    assert!(report.header_rebuilt);
    assert_eq!(file_len(&path), HEADER_LEN);
    let engine = Engine::open(&path, Config::default()).unwrap();
    assert!(engine.list().unwrap().is_empty());
}
