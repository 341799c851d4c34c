//! History snapshot compression
//!
//! Snapshots are compressed, then base64 encoded so the result is a plain
//! JSON string that never contains a newline.

use std::fmt;
use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::error::{FlatDocError, Result};

/// zstd level used for snapshots
const ZSTD_LEVEL: i32 = 3;

/// Compression applied to History snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    Zstd,
    Lz4,
    None,
}

impl Compression {
    /// Width of the `zip` header field
    pub const FIELD_WIDTH: usize = 4;

    pub fn as_str(&self) -> &'static str {
        match self {
            Compression::Zstd => "zstd",
            Compression::Lz4 => "lz4",
            Compression::None => "none",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "zstd" => Some(Compression::Zstd),
            "lz4" => Some(Compression::Lz4),
            "none" => Some(Compression::None),
            _ => None,
        }
    }

    /// Resolve into the compression capability
    pub fn compressor(&self) -> Box<dyn Compressor> {
        match self {
            Compression::Zstd => Box::new(ZstdCompressor),
            Compression::Lz4 => Box::new(Lz4Compressor),
            Compression::None => Box::new(Identity),
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reversible byte compression
pub trait Compressor: Send + Sync {
    fn compress(&self, bytes: &[u8]) -> std::io::Result<Vec<u8>>;
    fn decompress(&self, bytes: &[u8]) -> std::io::Result<Vec<u8>>;
}

struct ZstdCompressor;

impl Compressor for ZstdCompressor {
    fn compress(&self, bytes: &[u8]) -> std::io::Result<Vec<u8>> {
        zstd::encode_all(Cursor::new(bytes), ZSTD_LEVEL)
    }

    fn decompress(&self, bytes: &[u8]) -> std::io::Result<Vec<u8>> {
        zstd::decode_all(Cursor::new(bytes))
    }
}

struct Lz4Compressor;

impl Compressor for Lz4Compressor {
    fn compress(&self, bytes: &[u8]) -> std::io::Result<Vec<u8>> {
        Ok(lz4_flex::compress_prepend_size(bytes))
    }

    fn decompress(&self, bytes: &[u8]) -> std::io::Result<Vec<u8>> {
        lz4_flex::decompress_size_prepended(bytes)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

struct Identity;

impl Compressor for Identity {
    fn compress(&self, bytes: &[u8]) -> std::io::Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }

    fn decompress(&self, bytes: &[u8]) -> std::io::Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }
}

/// Compress `content` and encode it as a single-line string
pub fn encode_snapshot(compressor: &dyn Compressor, content: &str) -> Result<String> {
    let packed = compressor.compress(content.as_bytes())?;
    Ok(STANDARD.encode(packed))
}

/// Reverse [`encode_snapshot`]. `offset` is only used for error reporting.
pub fn decode_snapshot(compressor: &dyn Compressor, encoded: &str, offset: u64) -> Result<String> {
    let packed = STANDARD
        .decode(encoded)
        .map_err(|e| FlatDocError::corrupt(offset, format!("snapshot is not base64: {}", e)))?;
    let raw = compressor
        .decompress(&packed)
        .map_err(|e| FlatDocError::corrupt(offset, format!("snapshot decompression failed: {}", e)))?;
    String::from_utf8(raw)
        .map_err(|_| FlatDocError::corrupt(offset, "snapshot is not valid UTF-8"))
}
