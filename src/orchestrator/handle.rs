//! Runtime query surface over the published snapshot.

use arc_swap::ArcSwapOption;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use super::Snapshot;
use crate::transform::{PathRewriter, RewriteReader};

/// Cheap to clone; every clone sees the latest published snapshot.
#[derive(Debug, Clone)]
pub struct BuildHandle {
    published: Arc<ArcSwapOption<Snapshot>>,
    root: PathBuf,
}

impl BuildHandle {
    pub(super) fn new(published: Arc<ArcSwapOption<Snapshot>>, root: PathBuf) -> Self {
        Self { published, root }
    }

    /// Whether a build (or a loaded snapshot) has been published.
    pub fn is_ready(&self) -> bool {
        self.published.load().is_some()
    }

    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.published.load_full()
    }

    /// Public bootstrap paths; empty before the first build.
    pub fn bootstrap_paths(&self) -> Vec<String> {
        self.snapshot()
            .map(|s| s.bootstrap_paths())
            .unwrap_or_default()
    }

    /// Wrap a wire stream with path rewriting against the current snapshot.
    ///
    /// The snapshot is captured once; a build finishing mid-stream does not
    /// affect this stream. Before the first build the stream passes through.
    pub fn rewrite<R: Read>(&self, reader: R) -> RewriteReader<R> {
        let snapshot = self.snapshot().unwrap_or_default();
        RewriteReader::new(reader, PathRewriter::new(snapshot, &self.root))
    }
}
