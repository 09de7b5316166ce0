//! Build error taxonomy.
//!
//! Every variant is fatal for the current orchestration run only: persisted
//! state is written after success, so a failed run leaves the previous
//! snapshot authoritative. Stale-cache conditions are not errors; they are
//! logged and answered with a restart stamp (see `orchestrator::importmap`).

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    /// An entry point or dependency cannot be located.
    #[error("cannot resolve `{specifier}`: {reason}")]
    Resolution { specifier: String, reason: String },

    /// The directive of a boundary candidate could not be read.
    #[error("cannot classify `{specifier}`: {reason}")]
    Classification { specifier: String, reason: String },

    /// The bundler collaborator failed.
    #[error("bundler failed: {0}")]
    Bundle(String),

    /// A generated file, the snapshot or the import map could not be written.
    #[error("cannot write `{}`", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A persisted file exists but cannot be parsed.
    #[error("corrupt persisted state in `{}`: {reason}", path.display())]
    Corrupt { path: PathBuf, reason: String },

    /// Read-only deployment started without a prior build.
    #[error("must build before serving without write capability (no snapshot at `{}`)", .0.display())]
    ReadOnlyWithoutSnapshot(PathBuf),
}

impl BuildError {
    pub fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Persistence {
            path: path.into(),
            source,
        }
    }

    /// Short category label for status lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Resolution { .. } => "resolution",
            Self::Classification { .. } => "classification",
            Self::Bundle(_) => "bundle",
            Self::Persistence { .. } | Self::Corrupt { .. } => "persistence",
            Self::ReadOnlyWithoutSnapshot(_) => "read-only",
        }
    }
}
