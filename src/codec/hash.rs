//! Label hashing
//!
//! A document id is the first 8 bytes of `hash(label)` rendered as 16
//! lowercase hex digits. The algorithm is named in the header, so every id in
//! a file is produced by the same function.

use std::fmt;

use sha2::{Digest, Sha256};
use xxhash_rust::xxh3::xxh3_64;
use xxhash_rust::xxh64::xxh64;

/// Width of an id in hex digits
pub const ID_WIDTH: usize = 16;

/// Hash algorithms a file can be keyed with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HashAlgorithm {
    /// xxh3 64-bit (fast, non-cryptographic)
    #[default]
    Xxh3,

    /// xxh64 (legacy fast hash)
    Xxh64,

    /// SHA-256 truncated to 64 bits
    Sha256,
}

impl HashAlgorithm {
    /// Width of the `alg` header field
    pub const FIELD_WIDTH: usize = 6;

    /// Identifier stored in the header
    pub fn as_str(&self) -> &'static str {
        match self {
            HashAlgorithm::Xxh3 => "xxh3",
            HashAlgorithm::Xxh64 => "xxh64",
            HashAlgorithm::Sha256 => "sha256",
        }
    }

    /// Parse a header identifier (surrounding padding is ignored)
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "xxh3" => Some(HashAlgorithm::Xxh3),
            "xxh64" => Some(HashAlgorithm::Xxh64),
            "sha256" => Some(HashAlgorithm::Sha256),
            _ => None,
        }
    }

    /// Resolve the algorithm into its hashing capability
    pub fn hasher(&self) -> Box<dyn IdHasher> {
        match self {
            HashAlgorithm::Xxh3 => Box::new(Xxh3Hasher),
            HashAlgorithm::Xxh64 => Box::new(Xxh64Hasher),
            HashAlgorithm::Sha256 => Box::new(Sha256Hasher),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derives document ids from labels
pub trait IdHasher: Send + Sync {
    /// Which algorithm this is (recorded in the header)
    fn algorithm(&self) -> HashAlgorithm;

    /// First 8 bytes of the digest, big endian
    fn digest64(&self, label: &[u8]) -> [u8; 8];

    /// `hex(hash(label))[..16]`
    fn id(&self, label: &str) -> String {
        hex::encode(self.digest64(label.as_bytes()))
    }
}

struct Xxh3Hasher;

impl IdHasher for Xxh3Hasher {
    fn algorithm(&self) -> HashAlgorithm {
        HashAlgorithm::Xxh3
    }

    fn digest64(&self, label: &[u8]) -> [u8; 8] {
        xxh3_64(label).to_be_bytes()
    }
}

struct Xxh64Hasher;

impl IdHasher for Xxh64Hasher {
    fn algorithm(&self) -> HashAlgorithm {
        HashAlgorithm::Xxh64
    }

    fn digest64(&self, label: &[u8]) -> [u8; 8] {
        xxh64(label, 0).to_be_bytes()
    }
}

struct Sha256Hasher;

impl IdHasher for Sha256Hasher {
    fn algorithm(&self) -> HashAlgorithm {
        HashAlgorithm::Sha256
    }

    fn digest64(&self, label: &[u8]) -> [u8; 8] {
        let digest = Sha256::digest(label);
        let mut out = [0u8; 8];
        out.copy_from_slice(&digest[..8]);
        out
    }
}

/// True if `id` is exactly [`ID_WIDTH`] lowercase hex digits
pub fn is_valid_id(id: &str) -> bool {
    id.len() == ID_WIDTH && id.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
