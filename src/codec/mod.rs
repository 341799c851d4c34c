//! Codec Module
//!
//! Pluggable primitives the file format depends on, each chosen through a
//! configuration enum and resolved once into a trait object:
//! - `hash`: label → fixed-width hex id
//! - `compress`: History snapshot compression + text-safe encoding

mod compress;
mod hash;

pub use compress::{decode_snapshot, encode_snapshot, Compression, Compressor};
pub use hash::{is_valid_id, HashAlgorithm, IdHasher, ID_WIDTH};
