use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use rustc_hash::FxHashSet;

use crate::utils::path::normalize_path;

/// Minimum gap between two batches; absorbs the events of our own writes.
pub(super) const REBUILD_COOLDOWN_MS: u64 = 800;

/// Idle sleep when nothing is pending.
const IDLE: Duration = Duration::from_secs(86400);

/// Pure debouncer: timing and path deduplication only.
pub(super) struct Debouncer {
    debounce: Duration,
    /// Directories whose events never count (build output).
    ignored: Vec<PathBuf>,
    changes: FxHashSet<PathBuf>,
    last_event: Option<Instant>,
    last_batch: Option<Instant>,
}

impl Debouncer {
    pub(super) fn new(debounce: Duration, ignored: Vec<PathBuf>) -> Self {
        Self {
            debounce,
            ignored,
            changes: FxHashSet::default(),
            last_event: None,
            last_batch: None,
        }
    }

    pub(super) fn add_event(&mut self, event: &notify::Event) {
        use notify::EventKind;

        match event.kind {
            EventKind::Create(_) | EventKind::Remove(_) => {}
            // mtime/chmod noise would loop rebuilds
            EventKind::Modify(notify::event::ModifyKind::Metadata(_)) => return,
            EventKind::Modify(_) => {}
            _ => return,
        }

        crate::debug!("watch"; "raw notify: {:?} {:?}", event.kind, event.paths);

        for path in &event.paths {
            if is_temp_file(path) {
                continue;
            }
            let path = normalize_path(path);
            if self.ignored.iter().any(|dir| path.starts_with(dir)) {
                continue;
            }
            self.changes.insert(path);
            self.last_event = Some(Instant::now());
        }
    }

    /// Take the batch once debounce and cooldown elapsed.
    pub(super) fn take_if_ready(&mut self) -> Option<Vec<PathBuf>> {
        if !self.is_ready() {
            return None;
        }
        self.last_event = None;
        self.last_batch = Some(Instant::now());
        let mut changes: Vec<_> = self.changes.drain().collect();
        changes.sort();
        Some(changes)
    }

    pub(super) fn is_ready(&self) -> bool {
        let Some(last_event) = self.last_event else {
            return false;
        };
        if last_event.elapsed() < self.debounce {
            return false;
        }
        if let Some(last_batch) = self.last_batch
            && last_batch.elapsed() < Duration::from_millis(REBUILD_COOLDOWN_MS)
        {
            return false;
        }
        !self.changes.is_empty()
    }

    /// Sleep until the next possible ready time.
    pub(super) fn sleep_duration(&self) -> Duration {
        let Some(last_event) = self.last_event else {
            return IDLE;
        };

        let debounce_remaining = self.debounce.saturating_sub(last_event.elapsed());
        let cooldown_remaining = self
            .last_batch
            .map(|t| Duration::from_millis(REBUILD_COOLDOWN_MS).saturating_sub(t.elapsed()))
            .unwrap_or(Duration::ZERO);

        debounce_remaining
            .max(cooldown_remaining)
            .max(Duration::from_millis(1))
    }
}

/// Editor artifacts: backups, swap files, dotfiles.
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use notify::event::{CreateKind, DataChange, MetadataKind, ModifyKind};
    use notify::{Event, EventKind};

    fn event(kind: EventKind, path: &str) -> Event {
        Event::new(kind).add_path(PathBuf::from(path))
    }

    fn modified(path: &str) -> Event {
        event(EventKind::Modify(ModifyKind::Data(DataChange::Content)), path)
    }

    fn debouncer() -> Debouncer {
        Debouncer::new(Duration::ZERO, vec![PathBuf::from("/p/.splitbuild")])
    }

    #[test]
    fn test_dedup_and_sorted_batch() {
        let mut d = debouncer();
        d.add_event(&modified("/p/b.tsx"));
        d.add_event(&modified("/p/a.tsx"));
        d.add_event(&event(EventKind::Create(CreateKind::File), "/p/b.tsx"));
        assert!(d.is_ready());
        assert_eq!(
            d.take_if_ready().unwrap(),
            [PathBuf::from("/p/a.tsx"), PathBuf::from("/p/b.tsx")]
        );
        assert!(d.take_if_ready().is_none());
    }

    #[test]
    fn test_ignores_noise() {
        let mut d = debouncer();
        d.add_event(&event(
            EventKind::Modify(ModifyKind::Metadata(MetadataKind::WriteTime)),
            "/p/a.tsx",
        ));
        d.add_event(&modified("/p/.a.tsx.swp"));
        d.add_event(&modified("/p/a.tsx~"));
        d.add_event(&modified("/p/.splitbuild/default/ref/a.js"));
        assert!(!d.is_ready());
        assert_eq!(d.sleep_duration(), IDLE);
    }

    #[test]
    fn test_cooldown_holds_next_batch() {
        let mut d = debouncer();
        d.add_event(&modified("/p/a.tsx"));
        assert!(d.take_if_ready().is_some());

        d.add_event(&modified("/p/a.tsx"));
        assert!(!d.is_ready());
        assert!(d.sleep_duration() > Duration::from_millis(1));
    }

    #[test]
    fn test_debounce_window() {
        let mut d = Debouncer::new(Duration::from_secs(60), Vec::new());
        d.add_event(&modified("/p/a.tsx"));
        assert!(!d.is_ready());
        assert!(d.sleep_duration() > Duration::from_secs(50));
    }
}
