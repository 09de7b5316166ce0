//! Path and specifier utilities.
//!
//! Pure functions for path manipulation. No side effects.
//!
//! - [`fs`]: Filesystem path normalization (`normalize_path`, `resolve_path`)
//! - [`specifier`]: Module specifier helpers (`file://` ↔ path, public ids)

pub mod fs;
pub mod specifier;

pub use fs::{normalize_path, relative_slash, resolve_path};
pub use specifier::{canonical_id, file_path, file_url, is_remote, public_id};
