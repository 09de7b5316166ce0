//! Module-information collaborator.
//!
//! Specifier resolution (import maps, registries, redirects) is delegated to
//! an external tool. The default runs `deno info --json`, whose output is
//! parsed into [`InfoReport`].

use anyhow::{Context, Result};
use rustc_hash::FxHashMap;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::utils::exec::{Cmd, FilterRule};

/// Resolves one entry point to its reachable module list.
pub trait ModuleInfo: Send + Sync {
    fn info(&self, entry: &str) -> Result<InfoReport>;
}

/// Module graph as reported for one entry point.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoReport {
    #[serde(default)]
    pub roots: Vec<String>,
    #[serde(default)]
    pub modules: Vec<InfoModule>,
    /// Registry aliases: requested specifier → pinned specifier.
    #[serde(default)]
    pub redirects: FxHashMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoModule {
    pub specifier: String,
    #[serde(default)]
    pub local: Option<PathBuf>,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<InfoDependency>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InfoDependency {
    /// Literal import string at the call site.
    pub specifier: String,
    /// Resolved code target; absent for type-only imports.
    #[serde(default)]
    pub code: Option<InfoTarget>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InfoTarget {
    pub specifier: String,
}

const INFO_FILTER: FilterRule = FilterRule::new(&["Download", "Warning"]);

/// `deno info --json` runner.
pub struct DenoInfo {
    command: Vec<String>,
    import_map: Option<PathBuf>,
    cwd: PathBuf,
}

impl DenoInfo {
    pub fn new(command: Vec<String>, import_map: Option<PathBuf>, cwd: &Path) -> Self {
        Self {
            command,
            import_map: import_map.filter(|p| p.exists()),
            cwd: cwd.to_path_buf(),
        }
    }
}

impl ModuleInfo for DenoInfo {
    fn info(&self, entry: &str) -> Result<InfoReport> {
        let mut cmd = Cmd::from_slice(&self.command)
            .cwd(&self.cwd)
            .envs([("NO_COLOR", "1")])
            .filter(&INFO_FILTER);
        if let Some(map) = &self.import_map {
            cmd = cmd.arg(format!("--import-map={}", map.display()));
        }
        let output = cmd.arg(entry).run()?;

        serde_json::from_slice(&output.stdout)
            .with_context(|| format!("invalid module information for `{entry}`"))
    }
}
