//! Module graph: resolution, media filtering and directive classification.
//!
//! # Module Structure
//!
//! ```text
//! module/
//! ├── directive   # classify(prologue) -> Directive
//! ├── fetch       # SourceReader: local files, rate-limited HTTP
//! ├── limiter     # token bucket for network fetches
//! ├── info        # ModuleInfo collaborator (deno info --json)
//! └── graph       # resolve + classify_graph
//! ```

mod directive;
mod fetch;
mod graph;
mod info;
mod limiter;

pub use directive::{Directive, PROLOGUE_LEN, classify, classify_read};
pub use fetch::{Origin, PrologueReader, SourceReader};
pub use graph::{ModuleGraph, classify_graph, resolve};
pub use info::{DenoInfo, InfoDependency, InfoModule, InfoReport, InfoTarget, ModuleInfo};
pub use limiter::RateLimiter;

use std::path::PathBuf;

use crate::freshness::ContentHash;

/// Source kinds the pipeline understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    JavaScript,
    Mjs,
    Jsx,
    TypeScript,
    Mts,
    Tsx,
}

impl MediaKind {
    /// Parse a media type as reported by the module-information tool.
    ///
    /// Declarations, JSON, Wasm and CommonJS yield `None`.
    pub fn parse(media_type: &str) -> Option<Self> {
        match media_type {
            "JavaScript" => Some(Self::JavaScript),
            "Mjs" => Some(Self::Mjs),
            "JSX" | "Jsx" => Some(Self::Jsx),
            "TypeScript" => Some(Self::TypeScript),
            "Mts" => Some(Self::Mts),
            "TSX" | "Tsx" => Some(Self::Tsx),
            _ => None,
        }
    }
}

/// A dependency edge as written at the import site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// Literal import string.
    pub literal: String,
    /// Canonical specifier of the target, redirects resolved.
    pub target: String,
}

/// A resolved compilation unit.
#[derive(Debug, Clone)]
pub struct Module {
    /// Canonical specifier (`file://…` or `https://…`).
    pub specifier: String,
    /// Local copy (source file or download cache).
    pub local: Option<PathBuf>,
    pub media: MediaKind,
    /// Edges in declaration order.
    pub dependencies: Vec<Dependency>,
    /// Set once by [`classify_graph`].
    pub directive: Directive,
    /// Content fingerprint of local source files.
    pub fingerprint: Option<ContentHash>,
}

impl Module {
    /// Source file inside the project tree (not a download cache copy).
    pub fn source_path(&self) -> Option<PathBuf> {
        crate::utils::path::file_path(&self.specifier)
    }
}
