//! Bloom filter over sparse-region ids
//!
//! Built once when a handle opens, from the ids found at or above the
//! boundary. A negative answer lets a lookup skip the sparse scan entirely;
//! a positive answer only costs that scan. There are no false negatives for
//! any id that was inserted.

use xxhash_rust::xxh3::xxh3_128;

/// Probabilistic set: "is this id possibly in the sparse region?"
///
/// Sizing:
///   bits_per_key = -1.44 * log2(false_positive_rate)
///   num_hashes = bits_per_key * ln(2)
///
/// k positions come from double hashing: h_i = h1 + i * h2 (mod m), with
/// h1/h2 the halves of one 128-bit xxh3 digest.
#[derive(Debug, Clone)]
pub struct BloomFilter {
    bits: Vec<u64>,
    num_hashes: u32,
    num_bits: u64,
    len: usize,
}

impl BloomFilter {
    /// Create a filter sized for `expected_items` at the given rate.
    ///
    /// `false_positive_rate` must be in (0, 1); out-of-range values are
    /// clamped.
    pub fn new(expected_items: usize, false_positive_rate: f64) -> Self {
        let rate = false_positive_rate.clamp(1e-9, 0.5);
        let bits_per_key = -1.44 * rate.log2();

        let num_bits = ((expected_items.max(1) as f64) * bits_per_key).ceil() as u64;
        let num_bits = num_bits.max(64);

        let num_hashes = ((bits_per_key * 2.0f64.ln()).ceil() as u32).max(1);

        Self {
            bits: vec![0u64; num_bits.div_ceil(64) as usize],
            num_hashes,
            num_bits,
            len: 0,
        }
    }

    /// Add an id
    pub fn insert(&mut self, key: &[u8]) {
        let (h1, h2) = hash_key(key);
        for i in 0..self.num_hashes {
            let pos = self.position(h1, h2, i);
            self.bits[(pos / 64) as usize] |= 1 << (pos % 64);
        }
        self.len += 1;
    }

    /// false → definitely absent. true → possibly present.
    pub fn may_contain(&self, key: &[u8]) -> bool {
        let (h1, h2) = hash_key(key);
        (0..self.num_hashes).all(|i| {
            let pos = self.position(h1, h2, i);
            (self.bits[(pos / 64) as usize] >> (pos % 64)) & 1 == 1
        })
    }

    /// Number of insertions (duplicates included)
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
    }

    pub fn num_bits(&self) -> u64 {
        self.num_bits
    }

    fn position(&self, h1: u64, h2: u64, i: u32) -> u64 {
        h1.wrapping_add(u64::from(i).wrapping_mul(h2)) % self.num_bits
    }
}

fn hash_key(key: &[u8]) -> (u64, u64) {
    let hash = xxh3_128(key);
    (hash as u64, (hash >> 64) as u64)
}
