//! The engine worker thread.
//!
//! The worker is the only writer of the table and the only owner of the
//! watcher. Commands from the engine handle and events from the watcher are
//! consumed by one loop; debounced and retried reads are deadlines in the
//! pending queue.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::{after, never, select, Receiver, Sender};
use notify::RecommendedWatcher;

use super::load::{load_contents, FileReader, LoadReport, LoadWarning};
use super::pending::{EventDeduper, PendingOp, PendingQueue};
use super::status::{EngineShared, EventCounters};
use crate::config::LookupConfig;
use crate::error::Result;
use crate::processor::process_file;
use crate::table::TranslationTable;
use crate::watcher::{
    canonicalize_existing_path, create_directory_watcher, list_translation_files,
    normalize_event_path, path_in_scope, FileEvent, FileEventKind, WatcherEvent,
};

pub(crate) enum Command {
    Load {
        config: LookupConfig,
        reply: Sender<Result<LoadReport>>,
    },
    Event(FileEvent),
    Shutdown,
}

enum Step {
    Command(Option<Command>),
    Watch(Option<WatcherEvent>),
    Tick,
}

/// The loaded directory and the configuration it was loaded with.
struct ActiveDirectory {
    config: LookupConfig,
    root: PathBuf,
}

impl ActiveDirectory {
    fn contains_file(&self, path: &Path) -> bool {
        path_in_scope(&self.root, self.config.recursive, path) && self.config.matches_file(path)
    }

    fn contains(&self, path: &Path) -> bool {
        path != self.root && path.starts_with(&self.root)
    }
}

pub(crate) struct Worker {
    commands: Receiver<Command>,
    table: Arc<TranslationTable>,
    shared: Arc<EngineShared>,
    active: Option<ActiveDirectory>,
    _watcher: Option<RecommendedWatcher>,
    watch_events: Receiver<WatcherEvent>,
    pending: PendingQueue,
    deduper: EventDeduper,
    read_file: FileReader,
}

impl Worker {
    pub(crate) fn new(
        commands: Receiver<Command>,
        table: Arc<TranslationTable>,
        shared: Arc<EngineShared>,
    ) -> Self {
        Self {
            commands,
            table,
            shared,
            active: None,
            _watcher: None,
            watch_events: never(),
            pending: PendingQueue::default(),
            deduper: EventDeduper::new(LookupConfig::default().timing.dedup_window()),
            read_file: process_file,
        }
    }

    pub(crate) fn run(mut self) {
        loop {
            self.run_due(Instant::now());

            let deadline = match self.pending.next_due() {
                Some(due) => after(due.saturating_duration_since(Instant::now())),
                None => never(),
            };
            let step = select! {
                recv(self.commands) -> command => Step::Command(command.ok()),
                recv(self.watch_events) -> event => Step::Watch(event.ok()),
                recv(deadline) -> _ => Step::Tick,
            };

            match step {
                Step::Command(Some(Command::Load { config, reply })) => {
                    let result = self.load(config);
                    // The caller may have stopped waiting.
                    let _ = reply.send(result);
                }
                Step::Command(Some(Command::Event(event))) => self.handle_event(event),
                Step::Command(Some(Command::Shutdown)) | Step::Command(None) => break,
                Step::Watch(Some(event)) => self.handle_watch(event),
                Step::Watch(None) => {
                    log::warn!("translation watcher channel closed");
                    self.watch_events = never();
                }
                Step::Tick => {}
            }
        }
        self.stop_watch();
        log::debug!("translation worker stopped");
    }

    /// Loads `config.directory` in full and swaps it in.
    ///
    /// Configuration errors are returned before any state changes. A
    /// rejected first load leaves the engine in the error state.
    pub(crate) fn load(&mut self, config: LookupConfig) -> Result<LoadReport> {
        let result = self.try_load(config);
        if let Err(error) = &result {
            log::warn!("translation load rejected error={}", error);
            if self.active.is_none() {
                self.shared.fail(error.to_string());
            } else {
                self.shared.record_error(error.to_string());
            }
        }
        result
    }

    fn try_load(&mut self, config: LookupConfig) -> Result<LoadReport> {
        config.validate()?;
        let root = canonicalize_existing_path(config.directory.clone());
        let files = list_translation_files(&config, &root)?;

        self.stop_watch();
        self.pending.clear();
        self.deduper.set_window(config.timing.dedup_window());
        self.shared.begin_load(root.clone(), files.len());
        log::info!(
            "translation load start root={} files={} recursive={}",
            root.display(),
            files.len(),
            config.recursive
        );

        // Events arriving while files are read stay buffered in the channel
        // and are handled once the load has been swapped in.
        let watch = create_directory_watcher(&root, config.recursive);

        let (contents, mut report) = load_contents(&config, &root, &files, &self.shared);
        let keys = self.table.replace(contents);

        let watch_error = match watch {
            Ok((watcher, events)) => {
                self._watcher = Some(watcher);
                self.watch_events = events;
                None
            }
            Err(error) => {
                log::warn!(
                    "translation watcher disabled root={} error={}",
                    root.display(),
                    error
                );
                report.warnings.push(LoadWarning::WatchUnavailable {
                    error: error.to_string(),
                });
                Some(error.to_string())
            }
        };

        self.shared.finish_load(watch_error.is_none());
        if let Some(error) = watch_error {
            self.shared.record_error(error);
        }
        if files.is_empty() {
            log::info!("translation load found no files root={}", root.display());
        }
        log::info!(
            "translation load done root={} files={} loaded={} keys={} elapsed_ms={}",
            root.display(),
            report.files_found,
            report.files_loaded,
            keys,
            report.elapsed_ms
        );

        self.active = Some(ActiveDirectory { config, root });
        Ok(report)
    }

    fn stop_watch(&mut self) {
        self._watcher = None;
        self.watch_events = never();
        self.shared
            .watcher_enabled
            .store(false, std::sync::atomic::Ordering::Relaxed);
    }

    fn handle_watch(&mut self, event: WatcherEvent) {
        match event {
            WatcherEvent::Changes(events) => {
                for event in events {
                    self.handle_event(event);
                }
            }
            WatcherEvent::RescanRequired => {
                EventCounters::bump(&self.shared.counters.rescans);
                self.reload_active();
            }
            WatcherEvent::Error(message) => {
                EventCounters::bump(&self.shared.counters.watch_errors);
                log::warn!("translation watcher error error={}", message);
                self.shared.record_error(message);
            }
        }
    }

    fn reload_active(&mut self) {
        let Some(config) = self.active.as_ref().map(|active| active.config.clone()) else {
            return;
        };
        log::info!(
            "translation watcher lost events, reloading root={}",
            config.directory.display()
        );
        if let Err(error) = self.load(config) {
            log::warn!("translation reload failed error={}", error);
            self.shared.fail(error.to_string());
        }
    }

    /// Applies one file event: deletions at once, everything else after the
    /// debounce delay.
    pub(crate) fn handle_event(&mut self, event: FileEvent) {
        EventCounters::bump(&self.shared.counters.events_received);
        let Some(active) = &self.active else {
            log::debug!(
                "translation event ignored before load path={}",
                event.path.display()
            );
            return;
        };
        let Some(event) = scope_event(active, event) else {
            return;
        };
        let debounce = active.config.timing.debounce();

        let now = Instant::now();
        if self.deduper.is_duplicate(&event, now) {
            EventCounters::bump(&self.shared.counters.duplicates_dropped);
            log::debug!(
                "translation event deduplicated kind={} path={}",
                event.kind.as_str(),
                event.path.display()
            );
            return;
        }

        match event.kind {
            FileEventKind::Deleted => self.purge_deleted(&event.path),
            FileEventKind::Created | FileEventKind::Changed => {
                self.pending
                    .schedule(PendingOp::reprocess(event.path, now + debounce));
            }
            FileEventKind::Renamed => {
                let Some(old_path) = event.old_path else {
                    return;
                };
                let mut op = PendingOp::rename(old_path.clone(), event.path, now + debounce);
                if let Some(superseded) = self.pending.cancel(&old_path) {
                    op.also_purge.extend(superseded.also_purge);
                }
                self.pending.schedule(op);
            }
        }
        log::debug!("translation events pending count={}", self.pending.len());
    }

    fn purge_deleted(&mut self, path: &Path) {
        let mut purge = vec![path.to_path_buf()];
        purge.extend(self.table.files_under(path));
        let mut rename_sources = Vec::new();
        for file in &purge {
            if let Some(cancelled) = self.pending.cancel(file) {
                rename_sources.extend(cancelled.also_purge);
            }
        }
        purge.extend(rename_sources);

        let paths: Vec<&Path> = purge.iter().map(PathBuf::as_path).collect();
        let update = self.table.update_files(&paths, &[]);
        self.shared.touch();
        log::debug!(
            "translation file removed path={} files={} keys_removed={}",
            path.display(),
            purge.len(),
            update.removed
        );
    }

    /// Runs every pending operation due at `now`.
    pub(crate) fn run_due(&mut self, now: Instant) {
        if self.pending.is_empty() {
            return;
        }
        for op in self.pending.take_due(now) {
            self.execute(op, now);
        }
    }

    fn execute(&mut self, mut op: PendingOp, now: Instant) {
        let Some(active) = &self.active else {
            return;
        };
        let delimiter = active.config.delimiter;
        let quote = active.config.quote;
        let policy = active.config.timing.retry_policy();

        if op.failed_attempts == 0 {
            EventCounters::bump(&self.shared.counters.reprocessed_files);
        }

        let started = Instant::now();
        let error = match (self.read_file)(&op.path, delimiter, quote) {
            Ok(rows) => {
                let update = self.table.update_files(&op.purge_paths(), &rows);
                self.shared.touch();
                log::debug!(
                    "translation file reprocessed path={} keys_removed={} keys_inserted={} elapsed_ms={}",
                    op.path.display(),
                    update.removed,
                    update.inserted,
                    started.elapsed().as_millis()
                );
                return;
            }
            Err(error) if error.is_not_found() => {
                let update = self.table.update_files(&op.purge_paths(), &[]);
                self.shared.touch();
                log::debug!(
                    "translation file gone before reprocessing path={} keys_removed={}",
                    op.path.display(),
                    update.removed
                );
                return;
            }
            Err(error) => error,
        };

        if error.is_retryable() {
            let failed_attempts = op.failed_attempts + 1;
            if let Some(delay) = policy.delay_after(failed_attempts) {
                EventCounters::bump(&self.shared.counters.retries);
                log::debug!(
                    "translation file locked, retrying path={} attempt={} delay_ms={}",
                    op.path.display(),
                    failed_attempts,
                    delay.as_millis()
                );
                op.failed_attempts = failed_attempts;
                op.due = now + delay;
                self.pending.schedule(op);
                return;
            }
            EventCounters::bump(&self.shared.counters.retries_exhausted);
        }

        let update = self.table.update_files(&op.purge_paths(), &[]);
        self.shared.touch();
        self.shared.record_error(error.to_string());
        log::warn!(
            "translation file update dropped path={} attempts={} keys_removed={} error={}",
            op.path.display(),
            op.failed_attempts + 1,
            update.removed,
            error
        );
    }

    #[cfg(test)]
    fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Normalizes the paths of `event` and drops it unless it concerns a
/// translation file of the active directory.
///
/// A rename is narrowed to a deletion or a creation when only one side is a
/// translation file. Deletions of other paths inside the directory are kept so
/// a removed subdirectory purges its files.
fn scope_event(active: &ActiveDirectory, event: FileEvent) -> Option<FileEvent> {
    let path = normalize_event_path(&event.path);
    match event.kind {
        FileEventKind::Created | FileEventKind::Changed => {
            active.contains_file(&path).then_some(FileEvent {
                kind: event.kind,
                path,
                old_path: None,
            })
        }
        FileEventKind::Deleted => active.contains(&path).then(|| FileEvent::deleted(path)),
        FileEventKind::Renamed => {
            let old_path = event
                .old_path
                .as_deref()
                .map(normalize_event_path)
                .filter(|old_path| active.contains(old_path));
            match (old_path, active.contains_file(&path)) {
                (Some(old_path), true) if active.contains_file(&old_path) => {
                    Some(FileEvent::renamed(old_path, path))
                }
                (Some(old_path), false) => Some(FileEvent::deleted(old_path)),
                (_, true) => Some(FileEvent::created(path)),
                (None, false) => None,
            }
        }
    }
}
