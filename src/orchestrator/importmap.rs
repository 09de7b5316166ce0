//! Scoped import-map updater.
//!
//! Only the `"scopes"` table (and an `updateId` restart stamp) is touched.
//! Within a scope, entries whose target lies under this profile's reference
//! directory are *owned*; everything else is foreign and survives verbatim.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::BuildError;
use crate::utils::write::{WriteStatus, write_if_changed};

/// Scope → (import key → target).
pub type ScopeTable = BTreeMap<String, BTreeMap<String, String>>;

const SCOPES: &str = "scopes";
const UPDATE_ID: &str = "updateId";

/// Merge this run's scopes into an existing table.
///
/// Each scope in `fresh` has its owned entries replaced wholesale; foreign
/// entries survive. Scopes not in `fresh` are left alone. Scopes left empty
/// are removed.
pub fn merge(existing: &ScopeTable, fresh: &ScopeTable, controlled_prefix: &str) -> ScopeTable {
    let mut merged = existing.clone();
    for (scope, entries) in fresh {
        let mut next: BTreeMap<String, String> = existing
            .get(scope)
            .into_iter()
            .flatten()
            .filter(|(_, target)| !target.starts_with(controlled_prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        next.extend(entries.iter().map(|(k, v)| (k.clone(), v.clone())));

        if next.is_empty() {
            merged.remove(scope);
        } else {
            merged.insert(scope.clone(), next);
        }
    }
    merged
}

/// An import-map JSON document (standalone map or `deno.json`).
#[derive(Debug, Clone)]
pub struct ImportMapFile {
    path: PathBuf,
    document: Map<String, Value>,
}

impl ImportMapFile {
    /// Load the document; a missing file is an empty map.
    pub fn load(path: &Path) -> Result<Self, BuildError> {
        let document = match fs::read(path) {
            Ok(content) => serde_json::from_slice(&content).map_err(|e| BuildError::Corrupt {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Map::new(),
            Err(e) => return Err(BuildError::persistence(path, e)),
        };
        Ok(Self {
            path: path.to_path_buf(),
            document,
        })
    }

    /// Current scopes; non-string targets are ignored.
    pub fn scopes(&self) -> ScopeTable {
        let Some(Value::Object(scopes)) = self.document.get(SCOPES) else {
            return ScopeTable::new();
        };
        scopes
            .iter()
            .filter_map(|(scope, entries)| {
                let entries = entries.as_object()?;
                let entries = entries
                    .iter()
                    .filter_map(|(k, v)| Some((k.clone(), v.as_str()?.to_string())))
                    .collect();
                Some((scope.clone(), entries))
            })
            .collect()
    }

    /// Whether every expected entry is present with the expected target.
    pub fn contains_all(&self, expected: &ScopeTable) -> bool {
        let current = self.scopes();
        expected.iter().all(|(scope, entries)| {
            current.get(scope).is_some_and(|have| {
                entries
                    .iter()
                    .all(|(k, v)| have.get(k).is_some_and(|t| t == v))
            })
        })
    }

    /// Replace the scopes table; other top-level keys keep their order.
    pub fn set_scopes(&mut self, table: &ScopeTable) {
        let scopes: Map<String, Value> = table
            .iter()
            .map(|(scope, entries)| {
                let entries: Map<String, Value> = entries
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect();
                (scope.clone(), Value::Object(entries))
            })
            .collect();
        if scopes.is_empty() && !self.document.contains_key(SCOPES) {
            return;
        }
        self.document.insert(SCOPES.into(), Value::Object(scopes));
    }

    /// Stamp a restart token for runtimes that cached the old map.
    pub fn stamp_update_id(&mut self, id: &str) {
        self.document.insert(UPDATE_ID.into(), Value::String(id.into()));
    }

    pub fn update_id(&self) -> Option<&str> {
        self.document.get(UPDATE_ID).and_then(Value::as_str)
    }

    /// Write the document when its text changed.
    pub fn save(&self) -> Result<WriteStatus, BuildError> {
        let mut json = serde_json::to_string_pretty(&self.document).map_err(|e| BuildError::Corrupt {
            path: self.path.clone(),
            reason: e.to_string(),
        })?;
        json.push('\n');
        write_if_changed(&self.path, json).map_err(|e| BuildError::persistence(&self.path, e))
    }
}
