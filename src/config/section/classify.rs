//! `[classify]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [classify]
//! concurrency = 16     # Parallel prologue reads
//! rate = 20.0          # Network fetches per second (0 = unlimited)
//! burst = 10           # Token bucket capacity
//! ```

use serde::{Deserialize, Serialize};

use crate::config::ConfigDiagnostics;

/// Directive classification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifyConfig {
    /// Worker threads for prologue reads.
    pub concurrency: usize,

    /// Sustained network fetch rate per second.
    pub rate: f64,

    /// Fetches allowed in a burst before the rate applies.
    pub burst: u32,
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self {
            concurrency: 16,
            rate: 20.0,
            burst: 10,
        }
    }
}

impl ClassifyConfig {
    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.concurrency == 0 {
            diag.error("classify.concurrency", "concurrency must be at least 1");
        }
        if !self.rate.is_finite() || self.rate < 0.0 {
            diag.error("classify.rate", "rate must be a non-negative number");
        }
        if self.rate > 0.0 && self.burst == 0 {
            diag.error_with_hint(
                "classify.burst",
                "burst of 0 never admits a fetch",
                "set burst to 1 or more, or rate = 0 to disable limiting",
            );
        }
    }
}
