//! One-shot builds: `build` and `check`.

use anyhow::{Context, Result, bail};
use std::time::Instant;

use crate::config::ProjectConfig;
use crate::log;
use crate::orchestrator::{BuildOutcome, Orchestrator, Snapshot};

/// Run one build of the configured profile.
pub fn build(config: &ProjectConfig) -> Result<()> {
    let orchestrator = Orchestrator::from_config(config);
    let started = Instant::now();
    let outcome = orchestrator.build();
    orchestrator.dispose();

    match outcome {
        BuildOutcome::Rebuilt(snapshot) => {
            log!("build"; "{} in {}ms", summary(&snapshot), started.elapsed().as_millis());
            Ok(())
        }
        BuildOutcome::ServedFromCache(snapshot) => {
            log!("build"; "up to date, {}", summary(&snapshot));
            Ok(())
        }
        BuildOutcome::Failed(e) => {
            Err(e).with_context(|| format!("build of profile `{}` failed", config.build.profile))
        }
    }
}

/// Verify that the profile can be served without building.
///
/// Loads the persisted snapshot read-only and checks that every generated
/// proxy it references is on disk.
pub fn check(config: &ProjectConfig) -> Result<()> {
    let mut config = config.clone();
    config.build.read_only = Some(true);

    let orchestrator = Orchestrator::from_config(&config);
    let snapshot = orchestrator
        .build()
        .into_result()
        .with_context(|| format!("profile `{}` is not servable", config.build.profile))?;

    let layout = orchestrator.layout();
    let missing: Vec<_> = snapshot
        .artifacts
        .keys()
        .map(|id| layout.proxy_path(id))
        .filter(|path| !path.exists())
        .collect();
    if let Some(first) = missing.first() {
        bail!(
            "{} generated proxy file(s) missing, first: {}",
            missing.len(),
            first.display()
        );
    }

    log!("check"; "snapshot {} ok, {}", short_hash(&snapshot.hash), summary(&snapshot));
    for path in snapshot.bootstrap_paths() {
        log!("check"; "bootstrap {}", path);
    }
    Ok(())
}

fn summary(snapshot: &Snapshot) -> String {
    let bundles = snapshot
        .artifacts
        .values()
        .filter(|a| a.output.is_some())
        .count();
    format!(
        "{} boundary module(s), {} client bundle(s), {} bootstrap",
        snapshot.artifacts.len(),
        bundles,
        snapshot.bootstrap.len()
    )
}

fn short_hash(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::Artifact;

    #[test]
    fn test_summary_counts_bundles() {
        let mut snapshot = Snapshot::default();
        snapshot.artifacts.insert("/a.tsx".into(), Artifact::default());
        snapshot.artifacts.insert(
            "/b.tsx".into(),
            Artifact {
                output: Some("/_splitbuild/default/b-X.js".into()),
                ..Artifact::default()
            },
        );
        assert_eq!(
            summary(&snapshot),
            "2 boundary module(s), 1 client bundle(s), 0 bootstrap"
        );
    }

    #[test]
    fn test_short_hash() {
        assert_eq!(short_hash("0123456789abcdef"), "0123456789ab");
        assert_eq!(short_hash("abc"), "abc");
    }
}
