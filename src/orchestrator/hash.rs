//! Decision hash: whether a real build is needed.
//!
//! Inputs are public ids, never absolute paths, so the same project checked
//! out in two places hashes identically.

use std::collections::{BTreeMap, BTreeSet};

use crate::freshness::ContentHash;

/// Everything that can change the generated output.
#[derive(Debug, Clone, Copy)]
pub struct DecisionInputs<'a> {
    /// (public id, fingerprint hex) in graph order; remote modules carry none.
    pub modules: &'a [(String, Option<String>)],
    pub entry_points: &'a BTreeSet<String>,
    pub server_exports: &'a BTreeMap<String, Vec<String>>,
    pub profile: &'a str,
    pub namespace: &'a str,
    pub minify: bool,
}

/// Length-prefixed fields keep adjacent strings from running together.
fn field(hasher: &mut blake3::Hasher, value: &str) {
    hasher.update(&(value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}

pub fn decision_hash(inputs: &DecisionInputs<'_>) -> ContentHash {
    let mut hasher = blake3::Hasher::new();

    hasher.update(b"modules");
    for (id, fingerprint) in inputs.modules {
        field(&mut hasher, id);
        field(&mut hasher, fingerprint.as_deref().unwrap_or("-"));
    }

    hasher.update(b"entries");
    for id in inputs.entry_points {
        field(&mut hasher, id);
    }

    hasher.update(b"server");
    for (id, exports) in inputs.server_exports {
        field(&mut hasher, id);
        hasher.update(&(exports.len() as u64).to_le_bytes());
        for name in exports {
            field(&mut hasher, name);
        }
    }

    hasher.update(b"options");
    field(&mut hasher, inputs.profile);
    field(&mut hasher, inputs.namespace);
    hasher.update(&[u8::from(inputs.minify)]);

    ContentHash::new(*hasher.finalize().as_bytes())
}
