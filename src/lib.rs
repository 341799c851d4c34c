//! # flatdoc
//!
//! An embedded document store that lives in one plain-text file:
//! - One JSON record per line, readable and greppable as-is
//! - Hybrid index: binary search over a sorted block, linear scan over
//!   recent appends, optional Bloom filter in front of the scan
//! - Crash-tolerant appends with in-place fixed-width patching
//! - Compaction, purge, rehash and repair as atomic whole-file rewrites
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Engine                               │
//! │        (per-handle mutex + cross-process file lock)         │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┼─────────────────────┐
//!          │            │                     │
//!          ▼            ▼                     ▼
//!   ┌─────────────┐ ┌─────────────┐   ┌───────────────┐
//!   │ IndexEngine │ │WriteProtocol│   │  Compactor /  │
//!   │ sorted+scan │ │append+patch │   │ Repair scan   │
//!   └──────┬──────┘ └──────┬──────┘   └───────┬───────┘
//!          │               │                  │
//!          ▼               ▼                  ▼
//!   ┌─────────────────────────────────────────────────────────┐
//!   │   storage: Header | Index | Data | History records      │
//!   └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use flatdoc::{Config, Engine};
//!
//! let engine = Engine::open("notes.fdb", Config::default())?;
//! engine.set("todo", "buy milk")?;
//! assert_eq!(engine.get("todo")?, "buy milk");
//! engine.close()?;
//! # Ok::<(), flatdoc::FlatDocError>(())
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod codec;
pub mod storage;
pub mod bloom;
pub mod lock;
pub mod index;
pub mod writer;
pub mod compaction;
pub mod search;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{FlatDocError, Result};
pub use config::{Config, ConfigBuilder, LockMode};
pub use codec::{Compression, HashAlgorithm};
pub use compaction::{CompactionStats, RepairReport};
pub use engine::{Document, Engine, EngineStats};
pub use index::{Region, Resolution, Revision};
pub use storage::Header;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of flatdoc
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
