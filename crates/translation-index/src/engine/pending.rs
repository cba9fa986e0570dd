//! Debounced per-file operations and duplicate event suppression.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use fnv::FnvHashMap;

use crate::watcher::{FileEvent, FileEventKind};

/// A scheduled re-read of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOp {
    /// The file to re-read.
    pub path: PathBuf,
    /// Other files whose entries are purged with this one (rename sources).
    pub also_purge: Vec<PathBuf>,
    pub due: Instant,
    pub failed_attempts: u32,
}

impl PendingOp {
    pub fn reprocess(path: PathBuf, due: Instant) -> Self {
        Self {
            path,
            also_purge: Vec::new(),
            due,
            failed_attempts: 0,
        }
    }

    pub fn rename(old_path: PathBuf, path: PathBuf, due: Instant) -> Self {
        Self {
            path,
            also_purge: vec![old_path],
            due,
            failed_attempts: 0,
        }
    }

    /// Every path whose entries this operation replaces.
    pub fn purge_paths(&self) -> Vec<&Path> {
        self.also_purge
            .iter()
            .map(PathBuf::as_path)
            .chain(std::iter::once(self.path.as_path()))
            .collect()
    }
}

/// Pending operations keyed by path. Scheduling a path again replaces the
/// earlier operation, so only the last event of a burst runs.
#[derive(Debug, Default)]
pub struct PendingQueue {
    ops: FnvHashMap<PathBuf, PendingOp>,
}

impl PendingQueue {
    /// Schedules `op`, superseding any pending operation for the same path.
    ///
    /// Rename sources of the superseded operation are kept.
    pub fn schedule(&mut self, mut op: PendingOp) {
        if let Some(previous) = self.ops.remove(&op.path) {
            for old_path in previous.also_purge {
                if !op.also_purge.contains(&old_path) {
                    op.also_purge.push(old_path);
                }
            }
        }
        self.ops.insert(op.path.clone(), op);
    }

    pub fn cancel(&mut self, path: &Path) -> Option<PendingOp> {
        self.ops.remove(path)
    }

    pub fn clear(&mut self) {
        self.ops.clear();
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    #[cfg(test)]
    pub fn get(&self, path: &Path) -> Option<&PendingOp> {
        self.ops.get(path)
    }

    pub fn next_due(&self) -> Option<Instant> {
        self.ops.values().map(|op| op.due).min()
    }

    /// Removes and returns the operations due at `now`, earliest first.
    pub fn take_due(&mut self, now: Instant) -> Vec<PendingOp> {
        let due_paths: Vec<PathBuf> = self
            .ops
            .iter()
            .filter(|(_, op)| op.due <= now)
            .map(|(path, _)| path.clone())
            .collect();
        let mut due: Vec<PendingOp> = due_paths
            .iter()
            .filter_map(|path| self.ops.remove(path))
            .collect();
        due.sort_by_key(|op| op.due);
        due
    }
}

const DEDUP_PRUNE_THRESHOLD: usize = 1024;

/// Drops an event when the same kind of event for the same path was seen
/// within the window.
///
/// Duplicates are keyed by path and event kind: a deletion right after a
/// change of the same file is a new event, never a repeat. Only the last
/// accepted kind per path is remembered.
#[derive(Debug)]
pub struct EventDeduper {
    window: Duration,
    last_seen: FnvHashMap<PathBuf, (FileEventKind, Instant)>,
}

impl EventDeduper {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_seen: FnvHashMap::default(),
        }
    }

    pub fn set_window(&mut self, window: Duration) {
        self.window = window;
        self.last_seen.clear();
    }

    /// Returns true if `event` repeats the last accepted one; otherwise
    /// records it as accepted. Dropped repeats do not extend the window.
    pub fn is_duplicate(&mut self, event: &FileEvent, now: Instant) -> bool {
        if self.window.is_zero() {
            return false;
        }
        if self.last_seen.len() > DEDUP_PRUNE_THRESHOLD {
            let window = self.window;
            self.last_seen
                .retain(|_, (_, seen)| now.saturating_duration_since(*seen) < window);
        }

        let duplicate = matches!(
            self.last_seen.get(&event.path),
            Some((kind, seen)) if *kind == event.kind
                && now.saturating_duration_since(*seen) < self.window
        );
        if !duplicate {
            self.last_seen.insert(event.path.clone(), (event.kind, now));
        }
        duplicate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rescheduling_replaces_pending_op() {
        let now = Instant::now();
        let mut queue = PendingQueue::default();
        queue.schedule(PendingOp::reprocess("/d/a.csv".into(), now));
        queue.schedule(PendingOp::reprocess(
            "/d/a.csv".into(),
            now + Duration::from_millis(300),
        ));

        assert_eq!(queue.len(), 1);
        assert!(queue.take_due(now).is_empty());
        let due = queue.take_due(now + Duration::from_millis(300));
        assert_eq!(due.len(), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn rename_source_survives_a_later_change() {
        let now = Instant::now();
        let mut queue = PendingQueue::default();
        queue.schedule(PendingOp::rename("/d/old.csv".into(), "/d/new.csv".into(), now));
        queue.schedule(PendingOp::reprocess("/d/new.csv".into(), now));

        let due = queue.take_due(now);
        assert_eq!(
            due[0].purge_paths(),
            vec![Path::new("/d/old.csv"), Path::new("/d/new.csv")]
        );
    }

    #[test]
    fn take_due_orders_by_deadline() {
        let now = Instant::now();
        let mut queue = PendingQueue::default();
        queue.schedule(PendingOp::reprocess("/d/b.csv".into(), now + Duration::from_millis(2)));
        queue.schedule(PendingOp::reprocess("/d/a.csv".into(), now + Duration::from_millis(1)));
        queue.schedule(PendingOp::reprocess("/d/c.csv".into(), now + Duration::from_secs(60)));

        assert_eq!(queue.next_due(), Some(now + Duration::from_millis(1)));
        let due = queue.take_due(now + Duration::from_millis(5));
        let paths: Vec<_> = due.iter().map(|op| op.path.clone()).collect();
        assert_eq!(paths, vec![PathBuf::from("/d/a.csv"), PathBuf::from("/d/b.csv")]);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn cancel_removes_op() {
        let now = Instant::now();
        let mut queue = PendingQueue::default();
        queue.schedule(PendingOp::reprocess("/d/a.csv".into(), now));
        assert!(queue.cancel(Path::new("/d/a.csv")).is_some());
        assert!(queue.next_due().is_none());
    }

    #[test]
    fn dedup_drops_repeats_inside_window() {
        let now = Instant::now();
        let mut deduper = EventDeduper::new(Duration::from_millis(50));
        let event = FileEvent::changed("/d/a.csv");

        assert!(!deduper.is_duplicate(&event, now));
        assert!(deduper.is_duplicate(&event, now + Duration::from_millis(10)));
        assert!(!deduper.is_duplicate(&event, now + Duration::from_millis(100)));
    }

    #[test]
    fn dropped_repeats_do_not_extend_window() {
        let now = Instant::now();
        let mut deduper = EventDeduper::new(Duration::from_millis(50));
        let event = FileEvent::changed("/d/a.csv");

        assert!(!deduper.is_duplicate(&event, now));
        assert!(deduper.is_duplicate(&event, now + Duration::from_millis(30)));
        assert!(!deduper.is_duplicate(&event, now + Duration::from_millis(60)));
    }

    #[test]
    fn dedup_keeps_different_kinds_and_paths() {
        let now = Instant::now();
        let mut deduper = EventDeduper::new(Duration::from_millis(50));

        assert!(!deduper.is_duplicate(&FileEvent::changed("/d/a.csv"), now));
        assert!(!deduper.is_duplicate(&FileEvent::deleted("/d/a.csv"), now));
        assert!(!deduper.is_duplicate(&FileEvent::changed("/d/b.csv"), now));
    }

    #[test]
    fn dedup_remembers_only_the_last_kind_per_path() {
        let now = Instant::now();
        let mut deduper = EventDeduper::new(Duration::from_millis(50));

        assert!(!deduper.is_duplicate(&FileEvent::changed("/d/a.csv"), now));
        assert!(!deduper.is_duplicate(&FileEvent::deleted("/d/a.csv"), now));
        assert!(!deduper.is_duplicate(&FileEvent::changed("/d/a.csv"), now));
        assert!(deduper.is_duplicate(&FileEvent::changed("/d/a.csv"), now));
    }

    #[test]
    fn zero_window_disables_dedup() {
        let now = Instant::now();
        let mut deduper = EventDeduper::new(Duration::ZERO);
        let event = FileEvent::changed("/d/a.csv");
        assert!(!deduper.is_duplicate(&event, now));
        assert!(!deduper.is_duplicate(&event, now));
    }
}
