//! Freshness detection: blake3 content fingerprints for module sources.

mod cache;
mod hash;

pub use hash::{ContentHash, compute_bytes_hash, compute_file_hash};
