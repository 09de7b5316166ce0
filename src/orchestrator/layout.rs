//! On-disk layout of one build profile.
//!
//! ```text
//! <out_dir>/<profile>/
//! ├── ref/                    # generated reference code (import map targets)
//! │   └── components/
//! │       ├── Counter.tsx.js          # re-export proxy
//! │       └── Counter.tsx.client.js   # server-side client reference
//! ├── dist/                   # hashed client bundles
//! ├── .analyze/               # scratch output of the server pass
//! └── snapshot.json
//! ```

use std::path::{Path, PathBuf};

use super::BuildOptions;
use crate::boundary::Crossing;
use crate::utils::path::{file_path, is_remote, public_id, relative_slash};

#[derive(Debug, Clone)]
pub struct Layout {
    pub root: PathBuf,
    pub ref_dir: PathBuf,
    pub dist_dir: PathBuf,
    pub analyze_dir: PathBuf,
    pub snapshot: PathBuf,
    pub import_map: PathBuf,
    /// URL path under which `dist_dir` is served.
    public_base: String,
}

impl Layout {
    pub fn new(options: &BuildOptions) -> Self {
        let profile_dir = options.out_dir.join(&options.profile);
        Self {
            root: options.root.clone(),
            ref_dir: profile_dir.join("ref"),
            dist_dir: profile_dir.join("dist"),
            analyze_dir: profile_dir.join(".analyze"),
            snapshot: profile_dir.join("snapshot.json"),
            import_map: options.import_map.clone(),
            public_base: format!("{}/{}", options.public_prefix, options.profile),
        }
    }

    pub fn profile_dir(&self) -> &Path {
        self.snapshot.parent().unwrap_or(&self.root)
    }

    fn import_map_dir(&self) -> &Path {
        self.import_map.parent().unwrap_or(&self.root)
    }

    /// Public id of a canonical specifier.
    pub fn public_id(&self, specifier: &str) -> String {
        public_id(specifier, &self.root)
    }

    /// Relative location of a module's generated files under `ref/`.
    fn ref_stem(id: &str) -> String {
        if let Some(local) = id.strip_prefix('/') {
            return local.to_string();
        }
        let rest = id.split_once("://").map_or(id, |(_, rest)| rest);
        let clean: String = rest
            .chars()
            .map(|c| match c {
                'A'..='Z' | 'a'..='z' | '0'..='9' | '.' | '_' | '-' | '@' | '/' => c,
                _ => '_',
            })
            .collect();
        format!("_remote/{}", clean.trim_start_matches('/'))
    }

    /// Re-export proxy the import map points at.
    pub fn proxy_path(&self, id: &str) -> PathBuf {
        self.ref_dir.join(format!("{}.js", Self::ref_stem(id)))
    }

    /// Direction-specific reference code.
    pub fn reference_path(&self, id: &str, crossing: Crossing) -> PathBuf {
        let kind = match crossing {
            Crossing::Client => "client",
            Crossing::Server => "server",
        };
        self.ref_dir
            .join(format!("{}.{kind}.js", Self::ref_stem(id)))
    }

    /// Client-side call stub for a server module.
    pub fn stub_path(&self, id: &str) -> PathBuf {
        self.ref_dir.join(format!("{}.stub.js", Self::ref_stem(id)))
    }

    /// Import specifier that reaches `specifier` from the generated file `from`.
    pub fn import_from(&self, from: &Path, specifier: &str) -> String {
        match file_path(specifier) {
            Some(target) => {
                let dir = from.parent().unwrap_or(&self.root);
                dot_relative(relative_slash(&target, dir))
            }
            None => specifier.to_string(),
        }
    }

    /// Path as written in the import map (relative to the map's directory).
    pub fn map_relative(&self, path: &Path) -> String {
        dot_relative(relative_slash(path, self.import_map_dir()))
    }

    /// Import-map scope key for a module.
    pub fn scope_key(&self, specifier: &str) -> String {
        match file_path(specifier) {
            Some(path) => self.map_relative(&path),
            None => specifier.to_string(),
        }
    }

    /// Import-map entry key for an import of `target` written as `literal`.
    ///
    /// Relative keys resolve against the import map, not the importer, so
    /// they are re-expressed from the map's directory.
    pub fn entry_key(&self, literal: &str, target: &str) -> String {
        if !(literal.starts_with("./") || literal.starts_with("../")) {
            return literal.to_string();
        }
        match file_path(target) {
            Some(path) => self.map_relative(&path),
            None => target.to_string(),
        }
    }

    /// Prefix shared by every import-map target this profile owns.
    pub fn controlled_prefix(&self) -> String {
        format!("{}/", self.map_relative(&self.ref_dir))
    }

    /// Public URL path of a bundle output (relative to `dist_dir`).
    pub fn public_output(&self, output: &str) -> String {
        format!("{}/{}", self.public_base, output)
    }

    /// What the bundler is handed for a module specifier.
    pub fn bundle_input(&self, specifier: &str) -> String {
        match file_path(specifier) {
            Some(path) if path.starts_with(&self.root) => {
                format!("./{}", relative_slash(&path, &self.root))
            }
            Some(path) => path.display().to_string(),
            None => specifier.to_string(),
        }
    }

    /// Local file of a configured bootstrap/entry path, if it is one.
    pub fn project_file(&self, spec: &str) -> Option<PathBuf> {
        if is_remote(spec) || (spec.contains(':') && !spec.starts_with("file:")) {
            return None;
        }
        file_path(spec).or_else(|| Some(self.root.join(spec)))
    }
}

fn dot_relative(path: String) -> String {
    if path.starts_with("../") {
        path
    } else {
        format!("./{path}")
    }
}
