//! Global freshness cache for file content hashes.
//!
//! Entries are keyed by canonical path and validated against the file's
//! length and mtime, so an edited file is rehashed without explicit
//! invalidation.

use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::SystemTime;

use super::ContentHash;

/// File identity used to validate a cached hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Stamp {
    len: u64,
    modified: Option<SystemTime>,
}

impl Stamp {
    pub(super) fn of(path: &Path) -> Option<Self> {
        let meta = path.metadata().ok()?;
        Some(Self {
            len: meta.len(),
            modified: meta.modified().ok(),
        })
    }
}

/// Global cache for file content hashes (thread-safe).
pub struct FreshnessCache {
    hashes: DashMap<PathBuf, (Stamp, ContentHash)>,
}

impl FreshnessCache {
    pub fn new() -> Self {
        Self {
            hashes: DashMap::new(),
        }
    }

    pub(super) fn get(&self, path: &Path, stamp: Stamp) -> Option<ContentHash> {
        let canonical = path.canonicalize().ok()?;
        self.hashes
            .get(&canonical)
            .filter(|entry| entry.0 == stamp)
            .map(|entry| entry.1)
    }

    pub(super) fn set(&self, path: &Path, stamp: Stamp, hash: ContentHash) {
        if let Ok(canonical) = path.canonicalize() {
            self.hashes.insert(canonical, (stamp, hash));
        }
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

impl Default for FreshnessCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Global freshness cache instance.
pub static FRESHNESS_CACHE: LazyLock<FreshnessCache> = LazyLock::new(FreshnessCache::new);
