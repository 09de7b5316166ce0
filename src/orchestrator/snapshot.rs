//! Persisted build snapshot.
//!
//! Written atomically after every successful real build and loaded in
//! read-only deployments. Keys are public ids, so a snapshot built on one
//! machine is valid on another.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::Path;

use super::importmap::ScopeTable;
use crate::error::BuildError;
use crate::utils::write::{WriteStatus, write_atomic_if_changed};

/// Bumped whenever the layout of this file changes; older snapshots are
/// treated as absent.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Generated files and bundle output of one boundary module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Proxy path as written in the import map.
    pub proxy: String,
    /// Public path of the client bundle (client modules only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default)]
    pub exports: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: u32,
    /// Decision hash (blake3 hex).
    pub hash: String,
    pub profile: String,
    /// Bootstrap id → public bundle path, in configured order.
    #[serde(default)]
    pub bootstrap: Vec<(String, String)>,
    /// External pin → public bundle path.
    #[serde(default)]
    pub externals: BTreeMap<String, String>,
    /// Boundary module id → artifact.
    #[serde(default)]
    pub artifacts: BTreeMap<String, Artifact>,
    /// Observed local module id → content fingerprint (hex).
    #[serde(default)]
    pub locals: BTreeMap<String, String>,
    #[serde(default)]
    pub entry_points: BTreeSet<String>,
    /// Import-map entries this build expects to be present.
    #[serde(default)]
    pub scopes: ScopeTable,
    /// Server module id → export names from the preliminary pass.
    #[serde(default)]
    pub server_exports: BTreeMap<String, Vec<String>>,
}

impl Snapshot {
    /// Load a snapshot; `None` when the file is missing or from an older layout.
    pub fn load(path: &Path) -> Result<Option<Self>, BuildError> {
        let content = match fs::read(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(BuildError::persistence(path, e)),
        };
        let snapshot: Self = serde_json::from_slice(&content).map_err(|e| BuildError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok((snapshot.version == SNAPSHOT_VERSION).then_some(snapshot))
    }

    pub fn save(&self, path: &Path) -> Result<WriteStatus, BuildError> {
        let mut json = serde_json::to_string_pretty(self).map_err(|e| BuildError::Corrupt {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        json.push('\n');
        write_atomic_if_changed(path, json).map_err(|e| BuildError::persistence(path, e))
    }

    /// Hashed public output for a module id, if it was bundled.
    pub fn output_for(&self, id: &str) -> Option<&str> {
        self.artifacts
            .get(id)
            .and_then(|a| a.output.as_deref())
            .or_else(|| self.externals.get(id).map(String::as_str))
    }

    /// Public paths the client loads first, in configured order.
    pub fn bootstrap_paths(&self) -> Vec<String> {
        self.bootstrap.iter().map(|(_, path)| path.clone()).collect()
    }

    /// Whether a local module was part of the recorded graph.
    pub fn observes(&self, id: &str) -> bool {
        self.locals.contains_key(id)
    }
}
