//! `rewrite` command: stdin wire stream → stdout with bundle paths.

use anyhow::{Context, Result};
use std::io::{self, BufWriter, Write};

use crate::config::ProjectConfig;
use crate::orchestrator::Orchestrator;

pub fn rewrite(config: &ProjectConfig) -> Result<()> {
    let mut config = config.clone();
    config.build.read_only = Some(true);

    let orchestrator = Orchestrator::from_config(&config);
    orchestrator
        .build()
        .into_result()
        .context("no snapshot to rewrite with")?;

    let mut reader = orchestrator.handle().rewrite(io::stdin().lock());
    let mut writer = BufWriter::new(io::stdout().lock());
    io::copy(&mut reader, &mut writer).context("failed to rewrite stream")?;
    writer.flush().context("failed to flush output")?;
    Ok(())
}
