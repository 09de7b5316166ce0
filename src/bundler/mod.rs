//! Bundler collaborator.
//!
//! Module transformation is delegated to an external bundler treated as a
//! black box. The orchestrator only relies on this contract:
//!
//! - `analyze`: exported names per entry, no bundles kept
//! - `context` + `rebuild`: content-hashed, split, tree-shaken ESM bundles
//!   with a metafile mapping outputs back to entries; imports resolving to a
//!   stubbed file load the stub instead
//! - `dispose`: drop an incremental context whose entry set went stale

mod esbuild;
mod metafile;

pub use esbuild::EsbuildBundler;
pub use metafile::Metafile;

use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use crate::freshness::compute_bytes_hash;

/// One bundle entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    /// Public id (`/components/Counter.tsx`) or pinned specifier.
    pub id: String,
    /// What the bundler is handed (project-relative path or bare specifier).
    pub input: String,
}

impl EntryPoint {
    pub fn new(id: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            input: input.into(),
        }
    }

    /// Stable output name: readable stem plus a short digest of the id.
    pub fn name(&self) -> String {
        let stem = self
            .id
            .trim_end_matches('/')
            .rsplit(['/', ':', '@'])
            .next()
            .unwrap_or_default();
        let stem = stem.split('.').next().unwrap_or_default();
        let stem: String = stem
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        let digest = compute_bytes_hash(&self.id).to_hex();
        format!("{}_{}", if stem.is_empty() { "entry" } else { &stem }, &digest[..8])
    }
}

/// Everything a bundler run needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleRequest {
    /// Working directory; project-relative inputs resolve against it.
    pub cwd: PathBuf,
    pub entries: Vec<EntryPoint>,
    pub out_dir: PathBuf,
    /// Resolved file of a `"use server"` module → stub replacing it.
    pub stubs: Vec<(String, String)>,
    pub minify: bool,
}

impl BundleRequest {
    pub fn entry_ids(&self) -> BTreeSet<String> {
        self.entries.iter().map(|e| e.id.clone()).collect()
    }
}

/// Output of one entry point.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryOutput {
    /// Output file, `/`-separated and relative to the request's `out_dir`.
    pub path: String,
    pub exports: Vec<String>,
}

/// Outputs keyed by entry id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleResult {
    pub entries: BTreeMap<String, EntryOutput>,
}

/// External bundler.
pub trait Bundler: Send + Sync {
    /// Report the exports of each entry without keeping bundles.
    fn analyze(&self, request: &BundleRequest) -> Result<BundleResult>;

    /// Create an incremental context for a fixed entry set.
    fn context(&self, request: BundleRequest) -> Result<Box<dyn BundleContext>>;
}

/// Incremental build context.
pub trait BundleContext: Send {
    fn request(&self) -> &BundleRequest;

    fn rebuild(&mut self) -> Result<BundleResult>;

    fn dispose(self: Box<Self>);
}
