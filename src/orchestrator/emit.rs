//! Generated file output and garbage collection.

use jwalk::WalkDir;
use rustc_hash::FxHashSet;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::codegen::{GENERATED_MARKER, is_generated};
use crate::error::BuildError;
use crate::utils::write::{WriteStatus, write_if_changed};

/// Writes generated files and remembers what this run produced.
#[derive(Debug, Default)]
pub struct Emitter {
    keep: FxHashSet<PathBuf>,
    created: FxHashSet<PathBuf>,
    written: usize,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, path: &Path, content: &str) -> Result<WriteStatus, BuildError> {
        let status = write_if_changed(path, content).map_err(|e| BuildError::persistence(path, e))?;
        if status.is_written() {
            self.written += 1;
        }
        if matches!(status, WriteStatus::Created) {
            self.created.insert(path.to_path_buf());
        }
        self.keep.insert(path.to_path_buf());
        Ok(status)
    }

    /// Whether `path` did not exist before this run.
    pub fn was_created(&self, path: &Path) -> bool {
        self.created.contains(path)
    }

    /// Files actually written (created or updated).
    pub fn written(&self) -> usize {
        self.written
    }

    /// Delete generated files under `dir` this run did not produce.
    ///
    /// Files without the generated marker are never touched.
    pub fn collect_garbage(&self, dir: &Path) -> Result<usize, BuildError> {
        if !dir.exists() {
            return Ok(0);
        }
        let stale: Vec<PathBuf> = WalkDir::new(dir)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(|e| e.path())
            .filter(|path| !self.keep.contains(path) && has_marker(path))
            .collect();
        for path in &stale {
            fs::remove_file(path).map_err(|e| BuildError::persistence(path, e))?;
        }
        Ok(stale.len())
    }
}

fn has_marker(path: &Path) -> bool {
    let mut head = Vec::with_capacity(GENERATED_MARKER.len());
    File::open(path)
        .and_then(|f| f.take(GENERATED_MARKER.len() as u64).read_to_end(&mut head))
        .is_ok_and(|_| is_generated(&head))
}
