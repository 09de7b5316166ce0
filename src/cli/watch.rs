//! `watch` command.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ProjectConfig;
use crate::orchestrator::Orchestrator;
use crate::reload;

pub fn watch(config: &ProjectConfig) -> Result<()> {
    let orchestrator = Arc::new(Orchestrator::from_config(config));
    reload::watch(orchestrator, Duration::from_millis(config.watch.debounce_ms))
}
