//! `[tools]` and `[watch]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [tools]
//! info = ["deno", "info", "--json"]
//! bundler = ["deno", "run", "-A"]
//! esbuild = "npm:esbuild"
//!
//! [watch]
//! debounce_ms = 150
//! ```

use serde::{Deserialize, Serialize};

use crate::config::ConfigDiagnostics;

/// External collaborator commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Module-information command; must print the module graph as JSON.
    pub info: Vec<String>,

    /// JavaScript runtime hosting the bundler driver; the script path is appended.
    pub bundler: Vec<String>,

    /// Module specifier the driver imports esbuild from (`esbuild` under Node).
    pub esbuild: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            info: vec!["deno".into(), "info".into(), "--json".into()],
            bundler: vec!["deno".into(), "run".into(), "-A".into()],
            esbuild: "npm:esbuild".into(),
        }
    }
}

impl ToolsConfig {
    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.info.is_empty() {
            diag.error("tools.info", "command must not be empty");
        }
        if self.bundler.is_empty() {
            diag.error("tools.bundler", "command must not be empty");
        }
        if self.esbuild.trim().is_empty() {
            diag.error("tools.esbuild", "module specifier must not be empty");
        }
    }
}

/// Watch mode settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Quiet period before a batch of file events triggers a rebuild.
    pub debounce_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { debounce_ms: 150 }
    }
}
