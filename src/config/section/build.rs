//! `[build]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [build]
//! entry = ["app.tsx"]                 # Server entry modules
//! bootstrap = ["client.tsx"]          # Client hydration roots
//! external = ["react", "react-dom/client"]
//! import_map = "deno.json"            # Scoped entries are merged in here
//! profile = "default"
//! namespace = "splitbuild"            # Runtime imported by generated code
//! out_dir = ".splitbuild"
//! public_prefix = "/_splitbuild"      # URL prefix of client bundles
//! minify = false
//! # read_only = true                  # Omit to probe write capability
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::ConfigDiagnostics;

/// Build inputs and output layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildSectionConfig {
    /// Entry modules, resolved through the module-information tool.
    pub entry: Vec<String>,

    /// Client bootstrap modules bundled alongside boundary targets.
    pub bootstrap: Vec<String>,

    /// Externally pinned modules bundled as their own entry points.
    pub external: Vec<String>,

    /// Project import map (JSON) whose `scopes` are maintained.
    pub import_map: PathBuf,

    /// Build profile; outputs and import-map entries are kept per profile.
    pub profile: String,

    /// Module namespace of the runtime (`<namespace>/server`, `<namespace>/client`).
    pub namespace: String,

    /// Root of all generated output.
    pub out_dir: PathBuf,

    /// URL prefix under which client bundles are served.
    pub public_prefix: String,

    /// Minify client bundles.
    pub minify: bool,

    /// Force read-only mode; `None` probes write capability.
    pub read_only: Option<bool>,
}

impl Default for BuildSectionConfig {
    fn default() -> Self {
        Self {
            entry: vec!["app.tsx".into()],
            bootstrap: Vec::new(),
            external: Vec::new(),
            import_map: "deno.json".into(),
            profile: "default".into(),
            namespace: "splitbuild".into(),
            out_dir: ".splitbuild".into(),
            public_prefix: "/_splitbuild".into(),
            minify: false,
            read_only: None,
        }
    }
}

impl BuildSectionConfig {
    /// Output directory of the active profile.
    pub fn profile_dir(&self) -> PathBuf {
        self.out_dir.join(&self.profile)
    }

    /// Make relative paths absolute against the project root.
    pub fn normalize(&mut self, root: &Path) {
        self.import_map = root.join(&self.import_map);
        self.out_dir = root.join(&self.out_dir);
        self.public_prefix = self.public_prefix.trim_end_matches('/').to_string();
    }

    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.entry.is_empty() {
            diag.error("build.entry", "at least one entry module is required");
        }
        if self.profile.is_empty() || self.profile.contains(['/', '\\']) {
            diag.error_with_hint(
                "build.profile",
                format!("invalid profile name `{}`", self.profile),
                "use a plain directory name such as \"default\" or \"edge\"",
            );
        }
        if self.namespace.is_empty() {
            diag.error("build.namespace", "namespace must not be empty");
        }
        if !self.public_prefix.starts_with('/') {
            diag.error_with_hint(
                "build.public_prefix",
                format!("`{}` is not an absolute URL path", self.public_prefix),
                "start the prefix with `/`, e.g. \"/_splitbuild\"",
            );
        }
    }
}
