//! Watch loop.
//!
//! Watcher-first: notify is attached before the initial build is scheduled.
//! A bridge thread forwards notify events into the async loop, which
//! debounces them, keeps the paths the published snapshot observes and
//! hands rebuilds to the gate. Builds run on the blocking pool.

use anyhow::{Context, Result, anyhow};
use crossbeam::channel;
use notify::{RecursiveMode, Watcher};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::debouncer::Debouncer;
use super::gate::{Admission, RebuildGate};
use crate::logger::{status_error, status_success, status_unchanged};
use crate::orchestrator::{BuildOutcome, Orchestrator};
use crate::utils::path::normalize_path;
use crate::{debug, log};

/// Poll interval while waiting for the last build on shutdown.
const DRAIN_POLL: Duration = Duration::from_millis(50);

/// Build once, then rebuild on every relevant change until Ctrl+C.
pub fn watch(orchestrator: Arc<Orchestrator>, debounce: Duration) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start watch runtime")?;
    runtime.block_on(run(orchestrator, debounce))
}

async fn run(orchestrator: Arc<Orchestrator>, debounce: Duration) -> Result<()> {
    let options = orchestrator.options();
    let root = normalize_path(&options.root);

    let (notify_tx, notify_rx) = channel::unbounded();
    let mut watcher = notify::recommended_watcher(move |res| {
        let _ = notify_tx.send(res);
    })?;
    watcher
        .watch(&root, RecursiveMode::Recursive)
        .with_context(|| format!("failed to watch {}", root.display()))?;

    // Import map outside the project tree
    let import_map = normalize_path(&options.import_map);
    if !import_map.starts_with(&root)
        && let Some(dir) = import_map.parent()
    {
        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("failed to watch {}", dir.display()))?;
    }

    let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::unbounded_channel::<()>();
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(());
    })
    .map_err(|e| anyhow!("failed to set Ctrl+C handler: {}", e))?;

    let (async_tx, mut async_rx) = tokio::sync::mpsc::channel::<notify::Event>(64);
    std::thread::spawn(move || {
        while let Ok(result) = notify_rx.recv() {
            match result {
                Ok(event) => {
                    if async_tx.blocking_send(event).is_err() {
                        break;
                    }
                }
                Err(e) => log!("watch"; "notify error: {}", e),
            }
        }
    });

    let ignored: Vec<PathBuf> = vec![normalize_path(&options.out_dir)];
    let mut debouncer = Debouncer::new(debounce, ignored);
    let gate = Arc::new(RebuildGate::new());

    log!("watch"; "watching {} (profile {})", root.display(), options.profile);
    schedule(&orchestrator, &gate);

    loop {
        tokio::select! {
            biased;
            _ = shutdown_rx.recv() => break,
            Some(event) = async_rx.recv() => debouncer.add_event(&event),
            () = tokio::time::sleep(debouncer.sleep_duration()) => {
                let Some(changes) = debouncer.take_if_ready() else {
                    continue;
                };
                let relevant: Vec<_> = changes
                    .iter()
                    .filter(|path| orchestrator.observes(path))
                    .collect();
                if relevant.is_empty() {
                    debug!("watch"; "{} change(s) outside the module graph", changes.len());
                    continue;
                }
                for path in &relevant {
                    debug!("watch"; "changed: {}", path.display());
                }
                log!("watch"; "{} module(s) changed, rebuilding", relevant.len());
                schedule(&orchestrator, &gate);
            }
        }
    }

    log!("watch"; "shutting down...");
    drop(watcher);
    while !gate.is_idle() {
        tokio::time::sleep(DRAIN_POLL).await;
    }
    orchestrator.dispose();
    Ok(())
}

/// Start a build on the blocking pool, or queue it behind the running one.
fn schedule(orchestrator: &Arc<Orchestrator>, gate: &Arc<RebuildGate>) {
    match gate.request() {
        Admission::Start => {
            let orchestrator = Arc::clone(orchestrator);
            let gate = Arc::clone(gate);
            tokio::task::spawn_blocking(move || {
                loop {
                    let started = Instant::now();
                    report(&orchestrator.build(), started.elapsed());
                    if !gate.finish() {
                        break;
                    }
                }
            });
        }
        Admission::Queued => debug!("watch"; "build running, rebuild queued"),
        Admission::Absorbed => {}
    }
}

fn report(outcome: &BuildOutcome, elapsed: Duration) {
    match outcome {
        BuildOutcome::Rebuilt(snapshot) => status_success(&format!(
            "rebuilt {} module(s), {} bundle(s) in {}ms",
            snapshot.artifacts.len(),
            snapshot.artifacts.values().filter(|a| a.output.is_some()).count(),
            elapsed.as_millis()
        )),
        BuildOutcome::ServedFromCache(_) => status_unchanged("unchanged"),
        BuildOutcome::Failed(e) => status_error(&format!("{} error", e.kind()), &e.to_string()),
    }
}
