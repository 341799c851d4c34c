//! Tests for the Index Engine
//!
//! These tests verify:
//! - Sorted-region binary search after compaction
//! - Sparse-region scan with last-match-wins
//! - Mixed sorted/sparse resolution
//! - Bloom filter has no false negatives and is dropped when stale
//! - Handles notice files replaced by other handles

use std::io::Write;
use std::path::PathBuf;

use flatdoc::codec::IdHasher;
use flatdoc::storage::{DataRecord, Record};
use flatdoc::{Config, Engine, HashAlgorithm, Region};
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
    let path = temp_dir.path().join("index.fdb");
    let engine = Engine::open(&path, fast_config()).unwrap();
    (temp_dir, path, engine)
}

// =============================================================================
// Sorted Region Tests
// =============================================================================

#[test]
fn test_compacted_labels_resolve_in_sorted_region() {
    let (_temp, _path, engine) = setup();
    for i in 0..200 {
        engine.set(&format!("doc-{:03}", i), &format!("content {}", i)).unwrap();
    }
    engine.compact().unwrap();

    for i in 0..200 {
        let label = format!("doc-{:03}", i);
        let resolution = engine.resolve(&label).unwrap().unwrap();
        assert_eq!(resolution.region, Region::Sorted);
        assert_eq!(resolution.content(), Some(format!("content {}", i).as_str()));
    }
}

#[test]
fn test_sorted_miss_returns_none() {
    let (_temp, _path, engine) = setup();
    for i in 0..50 {
        engine.set(&format!("k{}", i), "v").unwrap();
    }
    engine.compact().unwrap();

    assert!(engine.resolve("absent").unwrap().is_none());
    assert!(engine.get("absent").unwrap_err().is_not_found());
}

#[test]
fn test_sorted_entry_stays_sorted_after_updates() {
    let (_temp, _path, engine) = setup();
    engine.set("a", "1").unwrap();
    engine.compact().unwrap();
    let original = engine.resolve("a").unwrap().unwrap().index_offset;

    for i in 2..6 {
        engine.set("a", &i.to_string()).unwrap();
        let resolution = engine.resolve("a").unwrap().unwrap();
        assert_eq!(resolution.region, Region::Sorted);
        assert_eq!(resolution.index_offset, original);
        assert_eq!(resolution.data.content, i.to_string());
    }
}

#[test]
fn test_data_record_without_pointer_patch_wins() {
    let (_temp, path, engine) = setup();
    engine.set("a", "1").unwrap();
    engine.compact().unwrap();
    engine.close().unwrap();

    // Crash after the Data append, before the `off` patch
    let orphan = Record::Data(DataRecord {
        id: HashAlgorithm::Xxh3.hasher().id("a"),
        label: "a".to_string(),
        ts: u64::MAX / 2,
        content: "2".to_string(),
    });
    let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&orphan.encode().unwrap()).unwrap();
    drop(file);

    let engine = Engine::open(&path, fast_config()).unwrap();
    let resolution = engine.resolve("a").unwrap().unwrap();
    assert_eq!(resolution.region, Region::Sorted);
    assert_eq!(engine.get("a").unwrap(), "2");
    assert_eq!(engine.search("2").unwrap().len(), 1);

    engine.compact().unwrap();
    assert_eq!(engine.get("a").unwrap(), "2");

    engine.set("a", "3").unwrap();
    assert_eq!(engine.get("a").unwrap(), "3");
}

#[test]
fn test_sorted_entry_soft_delete() {
    let (_temp, _path, engine) = setup();
    engine.set("a", "1").unwrap();
    engine.compact().unwrap();

    engine.delete("a").unwrap();

    let resolution = engine.resolve("a").unwrap().unwrap();
    assert_eq!(resolution.region, Region::Sorted);
    assert!(resolution.content().is_none());
    assert!(engine.get("a").unwrap_err().is_not_found());
}

// =============================================================================
// Sparse Region Tests
// =============================================================================

#[test]
fn test_uncompacted_labels_resolve_in_sparse_region() {
    let (_temp, _path, engine) = setup();
    engine.set("fresh", "x").unwrap();

    let resolution = engine.resolve("fresh").unwrap().unwrap();
    assert_eq!(resolution.region, Region::Sparse);
    assert!(resolution.index_offset.is_some());
}

#[test]
fn test_sparse_last_match_wins() {
    let (_temp, _path, engine) = setup();
    for i in 0..20 {
        engine.set("hot", &format!("v{}", i)).unwrap();
        engine.set(&format!("cold{}", i), "c").unwrap();
    }

    assert_eq!(engine.get("hot").unwrap(), "v19");
    assert_eq!(engine.history("hot").unwrap().len(), 19);
}

#[test]
fn test_mixed_sorted_and_sparse_resolution() {
    let (_temp, _path, engine) = setup();
    for i in 0..100 {
        engine.set(&format!("old{}", i), &format!("o{}", i)).unwrap();
    }
    engine.compact().unwrap();
    for i in 0..100 {
        engine.set(&format!("new{}", i), &format!("n{}", i)).unwrap();
    }
    for i in (0..100).step_by(3) {
        engine.set(&format!("old{}", i), "rewritten").unwrap();
    }

    for i in 0..100 {
        let old = engine.resolve(&format!("old{}", i)).unwrap().unwrap();
        assert_eq!(old.region, Region::Sorted);
        let expected = if i % 3 == 0 { "rewritten".to_string() } else { format!("o{}", i) };
        assert_eq!(engine.get(&format!("old{}", i)).unwrap(), expected);

        let new = engine.resolve(&format!("new{}", i)).unwrap().unwrap();
        assert_eq!(new.region, Region::Sparse);
        assert_eq!(engine.get(&format!("new{}", i)).unwrap(), format!("n{}", i));
    }
    assert_eq!(engine.list().unwrap().len(), 200);
}

// =============================================================================
// Bloom Filter Tests
// =============================================================================

#[test]
fn test_bloom_no_false_negatives_after_reopen() {
    init_tracing();
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("bloom.fdb");

    {
        let engine = Engine::open(&path, fast_config()).unwrap();
        for i in 0..500 {
            engine.set(&format!("label-{}", i), &i.to_string()).unwrap();
        }
        engine.close().unwrap();
    }

    let engine = Engine::open(&path, fast_config()).unwrap();
    // Index + Data per label
    assert_eq!(engine.stats().unwrap().bloom_entries, Some(1000));
    for i in 0..500 {
        assert_eq!(engine.get(&format!("label-{}", i)).unwrap(), i.to_string());
    }
}

#[test]
fn test_lookups_without_bloom() {
    init_tracing();
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("nobloom.fdb");
    let engine = Engine::open(&path, Config::builder().bloom_filter(false).build()).unwrap();

    engine.set("a", "1").unwrap();
    assert_eq!(engine.stats().unwrap().bloom_entries, None);
    assert_eq!(engine.get("a").unwrap(), "1");
    assert!(engine.get("b").unwrap_err().is_not_found());
}

#[test]
fn test_bloom_dropped_after_external_append() {
    let (_temp, path, reader) = setup();
    assert_eq!(reader.stats().unwrap().bloom_entries, Some(0));

    let writer = Engine::open(&path, fast_config()).unwrap();
    writer.set("outside", "written elsewhere").unwrap();

    // A stale filter would rule this id out
    assert_eq!(reader.get("outside").unwrap(), "written elsewhere");
    assert_eq!(reader.stats().unwrap().bloom_entries, None);
}

#[test]
fn test_handle_follows_external_compaction() {
    let (_temp, path, reader) = setup();
    reader.set("a", "1").unwrap();

    let other = Engine::open(&path, fast_config()).unwrap();
    other.set("b", "2").unwrap();
    other.compact().unwrap();

    assert_eq!(reader.get("a").unwrap(), "1");
    assert_eq!(reader.get("b").unwrap(), "2");
    assert_eq!(reader.resolve("b").unwrap().unwrap().region, Region::Sorted);
    assert!(reader.stats().unwrap().bloom_entries.is_some());

    reader.set("c", "3").unwrap();
    assert_eq!(other.get("c").unwrap(), "3");
}

#[test]
fn test_torn_tail_is_invisible_to_reads() {
    let (_temp, path, engine) = setup();
    engine.set("a", "1").unwrap();

    let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(br#"{"t":"d","id":"#).unwrap();
    drop(file);

    assert_eq!(engine.get("a").unwrap(), "1");
    assert_eq!(engine.list().unwrap(), vec!["a"]);
}
